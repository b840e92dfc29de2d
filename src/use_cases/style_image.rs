use std::sync::Arc;

use tracing::warn;

use crate::domain::entities::{AccountingBucket, Decision, Denial, Identity};
use crate::domain::errors::StoreError;
use crate::domain::ports::ImageGenerator;
use crate::domain::prompt::PromptPlan;
use crate::use_cases::entitlement::EntitlementLedger;

// What the generation step produced: styled bytes, or a fallback to the
// original upload when the provider failed. The request still succeeds on
// fallback; the note travels to the client.
pub enum GenerationResult {
    Styled(Vec<u8>),
    Fallback { note: String },
}

pub struct StyleSuccess {
    pub bucket: AccountingBucket,
    pub result: GenerationResult,
}

pub enum StyleError {
    Denied(Denial),
    Storage(StoreError),
}

// Restyle orchestration: entitlement gate, provider call, usage accounting.
// The debit happens before the expensive external call; the usage event is
// recorded regardless of provider outcome.
pub struct StyleImageUseCase {
    pub ledger: EntitlementLedger,
    pub generator: Arc<dyn ImageGenerator>,
}

impl StyleImageUseCase {
    pub async fn execute(
        &self,
        identity: &Identity,
        plan: &PromptPlan,
        image: Vec<u8>,
        filename: &str,
    ) -> Result<StyleSuccess, StyleError> {
        let bucket = match self
            .ledger
            .check_and_debit(identity)
            .await
            .map_err(StyleError::Storage)?
        {
            Decision::Allowed { bucket } => bucket,
            Decision::Denied(denial) => return Err(StyleError::Denied(denial)),
        };

        let result = match self.generator.restyle(image, filename, plan).await {
            Ok(bytes) => GenerationResult::Styled(bytes),
            Err(err) => {
                warn!(provider = self.generator.name(), error = %err, "generation failed, serving original");
                GenerationResult::Fallback {
                    note: format!("Generation error: {err}"),
                }
            }
        };

        self.ledger
            .record_usage(&identity.key())
            .await
            .map_err(StyleError::Storage)?;

        Ok(StyleSuccess { bucket, result })
    }
}
