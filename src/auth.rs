//! Bearer-token authentication against the Privy identity provider.
//!
//! Access tokens are ES256 JWTs verified locally with the app's verification
//! key; the caller's wallet address comes from the user's linked accounts.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use ethers::types::Address;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::parse_address;

const PRIVY_API_BASE: &str = "https://auth.privy.io/api/v1";
const PRIVY_ISSUER: &str = "privy.io";

#[derive(Clone)]
pub struct AuthGate {
    app_id: String,
    app_secret: String,
    decoding_key: DecodingKey,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct AuthedPlayer {
    pub user_id: String,
    pub wallet: Address,
}

#[derive(Debug, Deserialize)]
struct AccessTokenClaims {
    sub: String,
}

#[derive(Debug, Deserialize)]
struct PrivyUser {
    #[serde(default)]
    linked_accounts: Vec<LinkedAccount>,
}

#[derive(Debug, Deserialize)]
struct LinkedAccount {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    address: Option<String>,
}

impl AuthGate {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        // Dashboard exports carry escaped newlines.
        let pem = config.privy_verification_key.replace("\\n", "\n");
        let decoding_key = DecodingKey::from_ec_pem(pem.as_bytes())?;
        Ok(Self {
            app_id: config.privy_app_id.clone(),
            app_secret: config.privy_app_secret.clone(),
            decoding_key,
            api_base: PRIVY_API_BASE.to_string(),
            http: reqwest::Client::new(),
        })
    }

    /// Verifies the access token and resolves the caller's wallet address.
    pub async fn verify(&self, token: &str) -> Result<AuthedPlayer> {
        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_audience(&[&self.app_id]);
        validation.set_issuer(&[PRIVY_ISSUER]);

        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Auth(format!("invalid token: {e}")))?;
        let user_id = data.claims.sub;

        let user = self.fetch_user(&user_id).await?;
        let wallet = select_wallet(&user.linked_accounts)?;
        Ok(AuthedPlayer { user_id, wallet })
    }

    async fn fetch_user(&self, user_id: &str) -> Result<PrivyUser> {
        let url = format!("{}/users/{}", self.api_base, user_id);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.app_id, Some(&self.app_secret))
            .header("privy-app-id", &self.app_id)
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("identity provider unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Auth(format!(
                "identity provider returned {}",
                response.status()
            )));
        }
        response
            .json::<PrivyUser>()
            .await
            .map_err(|e| AppError::Auth(format!("malformed identity response: {e}")))
    }
}

/// First wallet-typed linked account becomes the request's caller.
fn select_wallet(accounts: &[LinkedAccount]) -> Result<Address> {
    let account = accounts
        .iter()
        .find(|a| a.kind == "wallet")
        .ok_or_else(|| AppError::Auth("no wallet account linked".to_string()))?;
    let raw = account
        .address
        .as_deref()
        .ok_or_else(|| AppError::Auth("linked wallet has no address".to_string()))?;
    parse_address(raw).map_err(|_| AppError::Auth(format!("linked wallet address is invalid: {raw}")))
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Auth("missing Authorization header".to_string()))?;
    let value = value
        .to_str()
        .map_err(|_| AppError::Auth("malformed Authorization header".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Auth("Authorization header must be a Bearer token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn account(kind: &str, address: Option<&str>) -> LinkedAccount {
        LinkedAccount {
            kind: kind.to_string(),
            address: address.map(str::to_string),
        }
    }

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn first_wallet_account_selected() {
        let wallet = format!("0x{}", "ab".repeat(20));
        let other = format!("0x{}", "cd".repeat(20));
        let accounts = vec![
            account("email", None),
            account("wallet", Some(&wallet)),
            account("wallet", Some(&other)),
        ];
        let selected = select_wallet(&accounts).unwrap();
        assert_eq!(selected, Address::from([0xab; 20]));
    }

    #[test]
    fn missing_or_invalid_wallet_rejected() {
        assert!(matches!(
            select_wallet(&[account("email", None)]),
            Err(AppError::Auth(_))
        ));
        assert!(matches!(
            select_wallet(&[account("wallet", Some("not-an-address"))]),
            Err(AppError::Auth(_))
        ));
    }

    #[test]
    fn linked_accounts_parse_from_provider_json() {
        let raw = format!(
            r#"{{"linked_accounts":[{{"type":"email","address":null}},{{"type":"wallet","address":"0x{}","chain_type":"ethereum"}}]}}"#,
            "ef".repeat(20)
        );
        let user: PrivyUser = serde_json::from_str(&raw).unwrap();
        assert_eq!(user.linked_accounts.len(), 2);
        assert_eq!(
            select_wallet(&user.linked_accounts).unwrap(),
            Address::from([0xef; 20])
        );
    }
}
