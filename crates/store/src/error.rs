use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("record '{id}' in collection '{collection}' was not found"))]
    NotFound {
        stage: &'static str,
        collection: String,
        id: String,
    },
    #[snafu(display("store id '{raw}' is invalid"))]
    InvalidId { stage: &'static str, raw: String },
    #[snafu(display("store rejected the request on `{stage}`: {details}"))]
    Rejected {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("subscription to '{collection}' is closed"))]
    SubscriptionClosed {
        stage: &'static str,
        collection: String,
    },
}

impl StoreError {
    /// Wraps a transport or permission failure reported by a store client.
    pub fn rejected(stage: &'static str, details: impl Into<String>) -> Self {
        Self::Rejected {
            stage,
            details: details.into(),
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::NotFound { stage, .. }
            | Self::InvalidId { stage, .. }
            | Self::Rejected { stage, .. }
            | Self::SubscriptionClosed { stage, .. } => stage,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
