use crate::models::{Claims, TokenType};
use jsonwebtoken::{DecodingKey, Validation, decode};

/// Decodes and validates an access token. Refresh tokens are rejected.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())?;

    if claims.token_type != TokenType::Access {
        return Err("Access token required".to_string());
    }

    Ok(claims)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::{SystemTime, UNIX_EPOCH};

    use jsonwebtoken::{EncodingKey, Header, encode};
    use uuid::Uuid;

    use crate::model::role::Role;
    use crate::models::{Claims, TokenType};

    pub const SECRET: &str = "test-secret";

    pub fn claims(user_id: u64, role: Role, agency_id: Option<u64>) -> Claims {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as usize;
        Claims {
            user_id,
            sub: format!("user-{user_id}"),
            role: role as u8,
            exp: now + 900,
            jti: Uuid::new_v4().to_string(),
            token_type: TokenType::Access,
            agency_id,
        }
    }

    pub fn sign(claims: &Claims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    pub fn token(user_id: u64, role: Role, agency_id: Option<u64>) -> String {
        sign(&claims(user_id, role, agency_id))
    }
}
