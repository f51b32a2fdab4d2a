use crate::models::client::ClientRecord;
use crate::services::clients::ClientRegistry;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid or inactive API key")]
    UnknownKey,

    #[error("Invalid or inactive API key")]
    Inactive,

    #[error("Client lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// Resolve an API key to an active client.
pub async fn authenticate(
    registry: &ClientRegistry,
    api_key: &str,
) -> Result<ClientRecord, AuthError> {
    let client = registry
        .get(api_key)
        .await?
        .ok_or(AuthError::UnknownKey)?;

    if !client.active {
        tracing::warn!(client_id = %client.id, "Rejected inactive client");
        return Err(AuthError::Inactive);
    }
    Ok(client)
}

/// Constant-time comparison for the admin key header.
pub fn is_admin_key(configured: &str, presented: Option<&str>) -> bool {
    let Some(presented) = presented else {
        return false;
    };
    if configured.is_empty() || configured.len() != presented.len() {
        return false;
    }
    configured
        .bytes()
        .zip(presented.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
