//! Structured records produced by the remote services.
//!
//! These types double as JSON schemas sent to the extraction service and the
//! language model, so field descriptions matter: they are part of the prompt.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Analysis of an investment spreadsheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvestmentSheetAnalysis {
    /// General trend for the investments
    pub general_trend: String,

    /// Best performing investment and reasons for it
    pub best_performing: String,

    /// Worst performing investment and reasons for it
    pub worst_performing: String,

    /// Suggestions on how to improve the portfolio, if any
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl fmt::Display for InvestmentSheetAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "The general trend of the investment is {}.", self.general_trend)?;
        writeln!(f, "{}.", self.best_performing)?;
        writeln!(f, "{}.", self.worst_performing)?;
        if self.suggestions.is_empty() {
            write!(f, "There are no suggestions on how to improve the portfolio")
        } else {
            write!(f, "Suggestions to improve the portfolio:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n- {}", suggestion)?;
            }
            Ok(())
        }
    }
}

/// Presentation categories known to the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationKind {
    ManagementPresentation,
    BoardUpdateDeck,
}

impl PresentationKind {
    pub const ALL: [PresentationKind; 2] = [Self::ManagementPresentation, Self::BoardUpdateDeck];

    /// Label used by the classification service
    pub fn label(self) -> &'static str {
        match self {
            Self::ManagementPresentation => "management_presentation",
            Self::BoardUpdateDeck => "board_update_deck",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }

    /// Rule description handed to the classifier
    pub fn description(self) -> &'static str {
        match self {
            Self::ManagementPresentation => {
                "A slide deck prepared by a company's management team to present operational \
                 performance, strategic initiatives, and key metrics to external parties such as \
                 investors, potential acquirers, or analysts. Typically promotional in tone and \
                 focused on highlighting growth opportunities, achievements, and the company's \
                 value proposition."
            }
            Self::BoardUpdateDeck => {
                "An internal slide deck prepared to inform the company's board of directors about \
                 current operations, financial performance, risks, and strategic decisions. \
                 Focused on accurate reporting, governance, and decision support rather than \
                 promotion, often including sensitive internal metrics and risk assessments."
            }
        }
    }

    /// JSON schema of the record extracted for this category
    pub fn extraction_schema(self) -> serde_json::Value {
        let schema = match self {
            Self::ManagementPresentation => schemars::schema_for!(ManagementPresentation),
            Self::BoardUpdateDeck => schemars::schema_for!(BoardUpdateDeck),
        };
        serde_json::to_value(schema).unwrap_or_default()
    }

    /// Validate extracted data against this category's record and format it
    pub fn format_record(self, data: serde_json::Value) -> Result<String, serde_json::Error> {
        Ok(match self {
            Self::ManagementPresentation => {
                serde_json::from_value::<ManagementPresentation>(data)?.to_string()
            }
            Self::BoardUpdateDeck => serde_json::from_value::<BoardUpdateDeck>(data)?.to_string(),
        })
    }
}

impl fmt::Display for PresentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Deck prepared by management for external parties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ManagementPresentation {
    /// Name of the company being presented
    pub company_name: String,

    /// Date the presentation was created or delivered (ISO string)
    pub presentation_date: String,

    /// Top KPIs or metrics highlighted, e.g., revenue growth, EBITDA
    pub key_metrics: Vec<String>,

    /// List of strategic initiatives or growth plans
    pub strategic_goals: Vec<String>,

    /// Intended audience, e.g., investors or acquirers
    pub target_audience: String,
}

impl fmt::Display for ManagementPresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Management Presentation for {} (Date: {})",
            self.company_name, self.presentation_date
        )?;
        writeln!(f, "Target Audience: {}", self.target_audience)?;
        writeln!(f, "Key Metrics: {}", self.key_metrics.join(", "))?;
        write!(f, "Strategic Goals: {}", self.strategic_goals.join(", "))
    }
}

/// Summary of financial performance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialSummary {
    /// Revenue as reported in the board update deck
    pub revenue: f64,

    /// Expenses as reported in the board update deck
    pub expenses: f64,

    /// Net profit as reported in the board update deck
    pub net_profit: f64,
}

impl fmt::Display for FinancialSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Revenue: {}, Expenses: {}, Net Profit: {}",
            format_currency(self.revenue),
            format_currency(self.expenses),
            format_currency(self.net_profit)
        )
    }
}

/// Internal deck reporting to the board of directors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoardUpdateDeck {
    /// Name of the company
    pub company_name: String,

    /// Start of the reporting period (ISO string)
    pub reporting_period_start: String,

    /// End of the reporting period (ISO string)
    pub reporting_period_end: String,

    /// Key risks, challenges, or operational issues
    pub risks_and_issues: Vec<String>,

    /// Summary of financial performance for what concerns revenue, expenses, net profit
    pub financial_summary: FinancialSummary,
}

impl fmt::Display for BoardUpdateDeck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Board Update Deck for {} (Reporting Period: {} to {})",
            self.company_name, self.reporting_period_start, self.reporting_period_end
        )?;
        writeln!(f, "Risks and Issues: {}", self.risks_and_issues.join(", "))?;
        write!(f, "Financial Summary: {}", self.financial_summary)
    }
}

/// `$1,234,567.89` style formatting; the sign follows the dollar sign
/// (`$-1,500.00`)
fn format_currency(amount: f64) -> String {
    let formatted = format!("{:.2}", amount.abs());
    let (whole, fraction) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    format!("${}{}.{}", sign, grouped, fraction)
}
