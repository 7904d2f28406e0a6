// Query model and keyword-based query analysis
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{PipelineError, Result};

/// Kind of question being asked; drives formatting instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    CharacterAnalysis,
    PlotSummary,
    DetailQuery,
    Comparison,
    WorldBuilding,
    General,
}

impl QueryCategory {
    pub const ALL: [QueryCategory; 6] = [
        QueryCategory::CharacterAnalysis,
        QueryCategory::PlotSummary,
        QueryCategory::DetailQuery,
        QueryCategory::Comparison,
        QueryCategory::WorldBuilding,
        QueryCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryCategory::CharacterAnalysis => "character_analysis",
            QueryCategory::PlotSummary => "plot_summary",
            QueryCategory::DetailQuery => "detail_query",
            QueryCategory::Comparison => "comparison",
            QueryCategory::WorldBuilding => "world_building",
            QueryCategory::General => "general",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QueryCategory::CharacterAnalysis => "Character Analysis",
            QueryCategory::PlotSummary => "Plot Summary",
            QueryCategory::DetailQuery => "Trivia & Details",
            QueryCategory::Comparison => "Comparison",
            QueryCategory::WorldBuilding => "World Building",
            QueryCategory::General => "General",
        }
    }

    /// Passages worth retrieving for this kind of question
    pub fn suggested_k(&self) -> usize {
        match self {
            QueryCategory::CharacterAnalysis => 4,
            QueryCategory::PlotSummary => 6,
            QueryCategory::DetailQuery => 3,
            QueryCategory::Comparison => 5,
            QueryCategory::WorldBuilding => 5,
            QueryCategory::General => 5,
        }
    }

    /// Formatting instruction appended to the system prompt
    pub fn instruction(&self) -> &'static str {
        match self {
            QueryCategory::CharacterAnalysis => "Focus on character development, personality traits, relationships, and key moments. Reference specific books when possible.",
            QueryCategory::PlotSummary => "Organize information chronologically and give a comprehensive overview of events. Include key details and outcomes.",
            QueryCategory::DetailQuery => "Be specific and precise with facts. Give exact details and reference the source material.",
            QueryCategory::Comparison => "Clearly contrast the elements being compared. Use a structured comparison with specific examples.",
            QueryCategory::WorldBuilding => "Explain how this part of the wizarding world works, its history, and where it appears in the books.",
            QueryCategory::General => "Give a well-rounded answer that covers all relevant aspects of the topic.",
        }
    }

    /// Example questions shown by the interactive shell
    pub fn examples(&self) -> &'static [&'static str] {
        match self {
            QueryCategory::CharacterAnalysis => &[
                "How does Snape's character develop throughout the series?",
                "What are the key traits of Hermione Granger?",
                "How does Draco Malfoy change over the books?",
            ],
            QueryCategory::PlotSummary => &[
                "Summarize the Triwizard Tournament from Goblet of Fire",
                "What happens during the Battle of Hogwarts?",
            ],
            QueryCategory::DetailQuery => &[
                "What is Harry Potter's patronus and how did he learn it?",
                "How do you make a Polyjuice Potion?",
            ],
            QueryCategory::Comparison => &["Compare Gryffindor and Slytherin values"],
            QueryCategory::WorldBuilding => &[
                "Describe the different houses at Hogwarts",
                "What is the history of the Marauder's Map?",
            ],
            QueryCategory::General => &["Tell me about magical creatures in the series"],
        }
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for QueryCategory {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "character" | "character_analysis" | "characters" => Ok(QueryCategory::CharacterAnalysis),
            "plot" | "plot_summary" | "events" | "plot_&_events" => Ok(QueryCategory::PlotSummary),
            "detail" | "details" | "detail_query" | "trivia" | "trivia_&_details" => {
                Ok(QueryCategory::DetailQuery)
            }
            "comparison" | "compare" => Ok(QueryCategory::Comparison),
            "world" | "world_building" | "worldbuilding" | "lore" => Ok(QueryCategory::WorldBuilding),
            "general" => Ok(QueryCategory::General),
            _ => Err(PipelineError::InvalidQuery(format!("unknown category '{}'", s.trim()))),
        }
    }
}

/// A single user question with an optional category hint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    category_hint: Option<String>,
}

impl Query {
    /// Trim and validate the question; blank hints are dropped
    pub fn new(text: &str, category_hint: Option<&str>) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::InvalidQuery("question is empty".to_string()));
        }
        let category_hint = category_hint
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string);

        Ok(Self {
            text: text.to_string(),
            category_hint,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn category_hint(&self) -> Option<&str> {
        self.category_hint.as_deref()
    }
}

/// Result of classifying a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub category: QueryCategory,
    /// True when the category came from an explicit hint
    pub from_hint: bool,
    pub suggested_k: usize,
    /// Word count
    pub complexity: usize,
}

/// Classify a question; a parseable hint wins over keyword inference
pub fn analyze_query(question: &str, category_hint: Option<&str>) -> QueryAnalysis {
    let hinted = category_hint.and_then(|h| h.parse::<QueryCategory>().ok());
    let category = hinted.unwrap_or_else(|| infer_category(question));

    QueryAnalysis {
        category,
        from_hint: hinted.is_some(),
        suggested_k: category.suggested_k(),
        complexity: question.split_whitespace().count(),
    }
}

fn infer_category(question: &str) -> QueryCategory {
    let lower = question.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    let has_phrase = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));
    let has_word = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

    if has_phrase(&["who is", "who was", "tell me about", "describe", "character"]) {
        QueryCategory::CharacterAnalysis
    } else if has_word(&["summarize", "summarise", "summary", "events", "plot"])
        || has_phrase(&["what happens", "what happened"])
    {
        QueryCategory::PlotSummary
    } else if has_word(&["compare", "comparison", "difference", "differences", "vs", "versus"]) {
        QueryCategory::Comparison
    } else if has_word(&["house", "houses", "history", "creature", "creatures", "government", "ministry", "world"]) {
        QueryCategory::WorldBuilding
    } else if has_word(&["how", "why", "what", "where", "when", "which", "trivia"]) {
        QueryCategory::DetailQuery
    } else {
        QueryCategory::General
    }
}
