use mirrorchat_store::StoreError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WidgetError {
    #[snafu(display("failed to mount bubble on `{stage}`: {details}"))]
    Mount {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("failed to subscribe on `{stage}`: {source}"))]
    Subscribe {
        stage: &'static str,
        source: StoreError,
    },
}

impl WidgetError {
    /// Builds a mount failure from a view backend outside this crate.
    pub fn mount(stage: &'static str, details: impl Into<String>) -> Self {
        Self::Mount {
            stage,
            details: details.into(),
        }
    }
}

pub type WidgetResult<T> = Result<T, WidgetError>;
