//! Postal code address lookup.
//!
//! Read-only, best-effort client for the external address lookup service
//! (ViaCEP-shaped). Every failure mode - bad code, network error, unknown
//! code - resolves to `None` and leaves the address fields blank.

use serde::Deserialize;
use tracing::debug;

/// Address fields resolved from a postal code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalAddress {
    pub street: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    /// The service reports unknown codes with `{"erro": true}` and 200.
    #[serde(default)]
    erro: bool,
    #[serde(default)]
    logradouro: Option<String>,
    #[serde(default)]
    bairro: Option<String>,
    #[serde(default)]
    localidade: Option<String>,
    #[serde(default)]
    uf: Option<String>,
}

/// Client for the postal lookup service.
#[derive(Clone)]
pub struct PostalLookupClient {
    client: reqwest::Client,
    base_url: String,
}

impl PostalLookupClient {
    /// Create a new lookup client for `base_url`.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a postal code to address fields, best-effort.
    ///
    /// Accepts masked (`38400-100`) or bare (`38400100`) input; anything
    /// that is not eight digits resolves to `None` without a request.
    pub async fn lookup(&self, postal_code: &str) -> Option<PostalAddress> {
        let digits: String = postal_code.chars().filter(char::is_ascii_digit).collect();
        if digits.len() != 8 {
            return None;
        }

        let url = format!("{}/ws/{digits}/json/", self.base_url);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(error) => {
                debug!(%error, "postal lookup unreachable");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(status = %response.status(), "postal lookup refused");
            return None;
        }
        let body: LookupResponse = match response.json().await {
            Ok(body) => body,
            Err(error) => {
                debug!(%error, "postal lookup body unreadable");
                return None;
            }
        };
        if body.erro {
            return None;
        }

        Some(PostalAddress {
            street: body.logradouro.unwrap_or_default(),
            neighborhood: body.bairro.unwrap_or_default(),
            city: body.localidade.unwrap_or_default(),
            state: body.uf.unwrap_or_default(),
        })
    }
}
