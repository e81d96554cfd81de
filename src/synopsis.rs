//! Synopsis rewriting.

use crate::error::GenerativeError;
use crate::generative::GenerativeBackend;
use std::sync::Arc;

const PROMPT_PREAMBLE: &str = "You are a creative writer specializing in compelling synopses for manga series.
Given the manga title and its original synopsis, rewrite and enhance the synopsis to be more engaging, intriguing, and descriptive.
Capture the essence of the story. Aim for 2-3 paragraphs. Output only the enhanced synopsis.";

/// Builds the rewrite prompt for one series.
pub fn build_prompt(title: &str, original: &str) -> String {
    format!(
        "{}\n\nManga Title: {}\nOriginal Synopsis:\n{}\n\nEnhanced Synopsis:\n",
        PROMPT_PREAMBLE,
        title.trim(),
        original.trim()
    )
}

/// Rewrites synopses through a text backend.
pub struct SynopsisEnhancer {
    backend: Arc<dyn GenerativeBackend>,
}

impl SynopsisEnhancer {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self { backend }
    }

    /// Returns the enhanced synopsis. Blank model output is an error.
    pub async fn enhance(&self, title: &str, original: &str) -> Result<String, GenerativeError> {
        let text = self
            .backend
            .generate_text(&build_prompt(title, original))
            .await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerativeError::EmptyResponse(
                "model returned no synopsis".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::DataUri;
    use async_trait::async_trait;

    struct CannedText(&'static str);

    #[async_trait]
    impl GenerativeBackend for CannedText {
        async fn colorize_image(&self, _: &DataUri, _: &str) -> Result<DataUri, GenerativeError> {
            Err(GenerativeError::ApiError("unused".to_string()))
        }

        async fn generate_text(&self, _: &str) -> Result<String, GenerativeError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_prompt("Ninja Way", " A young ninja. ");
        assert!(prompt.contains("Manga Title: Ninja Way\nOriginal Synopsis:\nA young ninja.\n"));
        assert!(prompt.ends_with("Enhanced Synopsis:\n"));
    }

    #[tokio::test]
    async fn test_enhance_trims() {
        let enhancer = SynopsisEnhancer::new(Arc::new(CannedText("  Better story.\n")));
        assert_eq!(enhancer.enhance("T", "S").await.unwrap(), "Better story.");
    }

    #[tokio::test]
    async fn test_blank_output_is_error() {
        let enhancer = SynopsisEnhancer::new(Arc::new(CannedText("   ")));
        assert!(matches!(
            enhancer.enhance("T", "S").await,
            Err(GenerativeError::EmptyResponse(_))
        ));
    }
}
