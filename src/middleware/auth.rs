// src/middleware/auth.rs

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::{
    common::error::AppError,
    config::AppState,
    models::auth::{Actor, Claims},
};

/// Valida o token (HS256) e devolve quem está chamando.
/// A emissão do token é feita por outro serviço; aqui só conferimos.
pub fn decode_actor(token: &str, secret: &str) -> Result<Actor, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;

    Ok(Actor {
        id: token_data.claims.sub,
        role: token_data.claims.role,
    })
}

// Extrator para obter o usuário autenticado diretamente nos handlers
pub struct AuthenticatedUser(pub Actor);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::InvalidToken)?;

        let app_state = AppState::from_ref(state);
        let actor = decode_actor(bearer.token(), &app_state.settings.jwt_secret)?;

        Ok(AuthenticatedUser(actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::Role;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    fn token_for(actor: &Actor, secret: &str, ttl: Duration) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: actor.id,
            role: actor.role,
            iat: now.timestamp() as usize,
            exp: (now + ttl).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn valid_token_yields_the_actor() {
        let actor = Actor { id: Uuid::new_v4(), role: Role::Admin };
        let token = token_for(&actor, "segredo", Duration::hours(1));

        assert_eq!(decode_actor(&token, "segredo").unwrap(), actor);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let actor = Actor { id: Uuid::new_v4(), role: Role::User };
        let token = token_for(&actor, "outro", Duration::hours(1));

        let err = decode_actor(&token, "segredo").unwrap_err();
        assert!(matches!(err, AppError::JwtError(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let actor = Actor { id: Uuid::new_v4(), role: Role::User };
        let token = token_for(&actor, "segredo", Duration::hours(-2));

        assert!(decode_actor(&token, "segredo").is_err());
    }
}
