use serde_json::Value;
use sha2::{Digest, Sha256};

/// 快取鍵：`{prefix}{action}:{sha256}`，雜湊涵蓋參數與（選用的）身分
pub fn build_cache_key(prefix: &str, action: &str, params: &Value, identity: Option<&str>) -> String {
    let mut material = String::new();
    material.push_str("{\"identity\":");
    match identity {
        Some(id) => write_canonical(&Value::String(id.to_string()), &mut material),
        None => material.push_str("null"),
    }
    material.push_str(",\"params\":");
    write_canonical(params, &mut material);
    material.push('}');

    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    format!("{}{}:{:x}", prefix, action, hasher.finalize())
}

/// 物件鍵排序後輸出，與 serde_json 是否保留插入順序無關
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
