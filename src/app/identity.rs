use crate::app::entrypoint::InvocationContext;
use crate::domain::model::{Identity, IdentitySource};
use serde_json::{Map, Value};

/// 依序從呼叫情境與事件中取得身分：
/// Cognito identity → client context → authorizer claims → API Gateway identity
pub fn extract_identity(event: &Value, invocation: &InvocationContext) -> Option<Identity> {
    from_cognito_context(invocation)
        .or_else(|| from_client_context(invocation))
        .or_else(|| from_authorizer(event))
        .or_else(|| from_gateway_identity(event))
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn from_cognito_context(invocation: &InvocationContext) -> Option<Identity> {
    let cognito = invocation.cognito_identity.as_ref()?;
    let id = non_empty(&cognito.identity_id)?;

    let mut identity = Identity::new(id, IdentitySource::CognitoContext);
    identity.pool_id = non_empty(&cognito.identity_pool_id).map(str::to_string);
    Some(identity)
}

fn from_client_context(invocation: &InvocationContext) -> Option<Identity> {
    let id = invocation
        .client_custom
        .get("identityId")
        .and_then(|id| non_empty(id))?;

    let mut identity = Identity::new(id, IdentitySource::ClientContext);
    identity.pool_id = invocation
        .client_custom
        .get("identityPoolId")
        .and_then(|pool| non_empty(pool))
        .map(str::to_string);
    Some(identity)
}

fn from_authorizer(event: &Value) -> Option<Identity> {
    let authorizer = event.get("requestContext")?.get("authorizer")?;

    // REST API 的 Cognito user pool 放在 claims，HTTP API 的 JWT 放在 jwt.claims
    let claims = authorizer
        .get("claims")
        .and_then(Value::as_object)
        .or_else(|| {
            authorizer
                .get("jwt")
                .and_then(|jwt| jwt.get("claims"))
                .and_then(Value::as_object)
        });

    if let Some(claims) = claims {
        let id = ["sub", "cognito:username", "username"]
            .iter()
            .find_map(|key| claims.get(*key).and_then(Value::as_str).and_then(non_empty))?;

        let mut identity = Identity::new(id, IdentitySource::Authorizer);
        identity.claims = claims.clone();
        return Some(identity);
    }

    // Lambda authorizer
    let principal = authorizer
        .get("principalId")
        .or_else(|| authorizer.get("lambda").and_then(|l| l.get("principalId")))
        .and_then(Value::as_str)
        .and_then(non_empty)?;

    let mut identity = Identity::new(principal, IdentitySource::Authorizer);
    identity.claims = authorizer.as_object().cloned().unwrap_or_else(Map::new);
    Some(identity)
}

fn from_gateway_identity(event: &Value) -> Option<Identity> {
    let gateway_identity = event.get("requestContext")?.get("identity")?;
    let id = gateway_identity
        .get("cognitoIdentityId")
        .and_then(Value::as_str)
        .and_then(non_empty)?;

    let mut identity = Identity::new(id, IdentitySource::GatewayIdentity);
    identity.pool_id = gateway_identity
        .get("cognitoIdentityPoolId")
        .and_then(Value::as_str)
        .and_then(non_empty)
        .map(str::to_string);
    Some(identity)
}
