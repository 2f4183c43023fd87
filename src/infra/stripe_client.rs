use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{
    app_error::{AppError, AppResult},
    infra::http_client::build_client,
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Thin REST client for the parts of the Stripe API the engine uses.
///
/// Every failure, including non-2xx responses and undecodable bodies, is
/// reported as `AppError::OracleUnavailable`.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: SecretString) -> Self {
        Self::with_api_base(secret_key, STRIPE_API_BASE)
    }

    /// Point the client at a different API host, e.g. stripe-mock.
    pub fn with_api_base(secret_key: SecretString, api_base: &str) -> Self {
        Self {
            client: build_client(),
            secret_key,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    // ========================================================================
    // Customers
    // ========================================================================

    pub async fn find_customer_by_email(&self, email: &str) -> AppResult<Option<StripeCustomer>> {
        let response = self
            .client
            .get(self.url("customers"))
            .header("Authorization", self.auth_header())
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await
            .map_err(transport_error)?;

        let list: StripeList<StripeCustomer> = self.handle_response(response).await?;
        Ok(list.data.into_iter().next())
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// All subscriptions for a customer, newest first.
    pub async fn list_subscriptions(&self, customer_id: &str) -> AppResult<Vec<StripeSubscription>> {
        let response = self
            .client
            .get(self.url("subscriptions"))
            .header("Authorization", self.auth_header())
            .query(&[("customer", customer_id), ("status", "all"), ("limit", "100")])
            .send()
            .await
            .map_err(transport_error)?;

        let list: StripeList<StripeSubscription> = self.handle_response(response).await?;
        Ok(list.data)
    }

    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> AppResult<StripeSubscription> {
        let url = self.url(&format!("subscriptions/{}", subscription_id));
        let request = if at_period_end {
            self.client
                .post(url)
                .form(&[("cancel_at_period_end", "true")])
        } else {
            self.client.delete(url)
        };

        let response = request
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(transport_error)?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Checkout Sessions
    // ========================================================================

    pub async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams<'_>,
    ) -> AppResult<StripeCheckoutSession> {
        let response = self
            .client
            .post(self.url("checkout/sessions"))
            .header("Authorization", self.auth_header())
            .form(&params.to_form())
            .send()
            .await
            .map_err(transport_error)?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::OracleUnavailable(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");

            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(AppError::OracleUnavailable(format!(
                    "Stripe error: {}",
                    error.error.message.unwrap_or(error.error.error_type)
                )));
            }

            return Err(AppError::OracleUnavailable(format!(
                "Stripe API error: {}",
                status
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Stripe response");
            AppError::OracleUnavailable(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

fn transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::OracleUnavailable("Stripe request timed out".into())
    } else {
        AppError::OracleUnavailable(format!("Stripe request failed: {}", e))
    }
}

/// Form parameters for `POST /checkout/sessions`.
#[derive(Debug)]
pub struct CheckoutSessionParams<'a> {
    pub customer_id: Option<&'a str>,
    pub customer_email: Option<&'a str>,
    pub price_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
    pub client_reference_id: &'a str,
    pub trial_days: Option<u32>,
}

impl CheckoutSessionParams<'_> {
    fn to_form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", self.price_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", self.success_url.to_string()),
            ("cancel_url", self.cancel_url.to_string()),
            ("client_reference_id", self.client_reference_id.to_string()),
        ];

        if let Some(customer) = self.customer_id {
            form.push(("customer", customer.to_string()));
        } else if let Some(email) = self.customer_email {
            form.push(("customer_email", email.to_string()));
        }

        if let Some(days) = self.trial_days.filter(|d| *d > 0) {
            form.push(("subscription_data[trial_period_days]", days.to_string()));
        }

        form
    }
}

// ============================================================================
// Stripe Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub created: i64,
    /// Newer API versions report the period on the items instead.
    pub current_period_end: Option<i64>,
    pub trial_end: Option<i64>,
    pub cancel_at: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

impl StripeSubscription {
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .iter()
                .filter_map(|item| item.current_period_end)
                .max()
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub id: String,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeError,
}

#[derive(Debug, Deserialize)]
pub struct StripeError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: Option<String>,
    pub code: Option<String>,
}
