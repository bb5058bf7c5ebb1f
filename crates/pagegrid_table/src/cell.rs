//! Display state of a single cell.

use pagegrid_core::constants::FAILED_CELL_TEXT;
use pagegrid_core::model::Value;
use pagegrid_core::proxy::{MessageKind, RowProxy};
use pagegrid_core::validation::Severity;

#[derive(Debug, Clone, PartialEq)]
pub enum CellDisplay {
    Value(Value),
    /// The row's page is still being fetched.
    Loading,
    /// The row's page failed to load.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellState {
    pub display: CellDisplay,
    /// Foreground cue: worst of the property verdict and the row messages.
    pub severity: Severity,
    pub tooltip: Option<String>,
    /// `false` for placeholders and rows with an operation in flight.
    pub editable: bool,
    pub modified: bool,
}

impl CellState {
    pub(crate) fn of(proxy: &RowProxy, property: &str) -> Self {
        if proxy.is_dummy() {
            let failure = proxy
                .worst_message()
                .filter(|message| message.kind == MessageKind::Error);
            return match failure {
                Some(message) => Self {
                    display: CellDisplay::Failed,
                    severity: Severity::Error,
                    tooltip: Some(message.text.clone()),
                    editable: false,
                    modified: false,
                },
                None => Self {
                    display: CellDisplay::Loading,
                    severity: Severity::Ok,
                    tooltip: None,
                    editable: false,
                    modified: false,
                },
            };
        }

        let verdict = proxy.property_validation(property);
        let message = proxy.worst_message();
        let verdict_severity = verdict.map(|result| result.severity()).unwrap_or_default();
        let message_severity = message.map(|m| m.severity()).unwrap_or_default();
        let tooltip = verdict
            .and_then(|result| result.message())
            .map(str::to_string)
            .or_else(|| message.map(|m| m.text.clone()));
        Self {
            display: CellDisplay::Value(proxy.value(property).cloned().unwrap_or_default()),
            severity: verdict_severity.max(message_severity),
            tooltip,
            editable: !proxy.has_execution(),
            modified: proxy.is_property_modified(property),
        }
    }

    /// Text to render.
    pub fn text(&self) -> String {
        match &self.display {
            CellDisplay::Value(value) => value.to_string(),
            CellDisplay::Loading => String::new(),
            CellDisplay::Failed => FAILED_CELL_TEXT.to_string(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.display == CellDisplay::Loading
    }
}
