use crate::services::notifier::Redirector;

/// Redirector for headless use: records the re-authentication request in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRedirector;

impl Redirector for LogRedirector {
    fn redirect(&self, target: &str) {
        tracing::warn!(target_path = %target, "Re-authentication required");
    }
}
