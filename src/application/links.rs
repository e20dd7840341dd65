use crate::domain::record::InvoiceId;
use crate::error::{RecoveryError, Result};
use rand::RngCore;
use url::Url;

/// Mints the URL a customer follows to settle a failed invoice.
pub trait LinkGenerator: Send + Sync {
    fn generate(&self, invoice_id: &InvoiceId) -> Result<String>;
}

/// Produces `<base>/<invoice id>?token=<random hex>` links.
///
/// The token makes every minted link distinct, so a replaced link can be
/// told apart from the one it superseded.
#[derive(Debug, Clone)]
pub struct TokenLinkGenerator {
    base: Url,
}

impl TokenLinkGenerator {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| RecoveryError::Config(format!("Invalid link base URL `{base_url}`: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(RecoveryError::Config(format!(
                "Link base URL `{base_url}` cannot carry a path"
            )));
        }
        Ok(Self { base })
    }
}

impl LinkGenerator for TokenLinkGenerator {
    fn generate(&self, invoice_id: &InvoiceId) -> Result<String> {
        let mut token = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut token);

        let mut link = self.base.clone();
        link.path_segments_mut()
            .map_err(|_| RecoveryError::Config("Link base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(invoice_id.as_str());
        link.query_pairs_mut()
            .clear()
            .append_pair("token", &hex::encode(token));
        Ok(link.into())
    }
}
