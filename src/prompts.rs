//! Prompt sections and the structured context sent to the LLM.
//!
//! A prompt is an ordered list of plain-text sections: a preamble shared
//! by all formats (persona, output rules, today's date) followed by the
//! format's own instructions. The entries themselves travel separately as
//! a JSON [`PromptContext`] which the summarizer appends after an
//! `Information:` marker.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Serialize;
use std::str::FromStr;

use crate::config::{AssistantConfig, Config, UserData};
use crate::models::{Entry, Metadata};

/// What kind of summary to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptFormat {
    /// Greeting plus today's and tomorrow's entries.
    Today,
    /// This week's schedule, todos and reminders.
    Week,
    /// Past week, today in detail and a line per future day.
    Full,
    /// Answer the question in `EmployerQuestion`; used by chat.
    Custom,
}

impl FromStr for PromptFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "today" => Ok(PromptFormat::Today),
            "week" => Ok(PromptFormat::Week),
            "full" => Ok(PromptFormat::Full),
            "custom" => Ok(PromptFormat::Custom),
            other => bail!("unknown format: {}", other),
        }
    }
}

const PREAMBLE: &[&str] = &[
    "Your entire response should be formatted in Markdown",
    "Use the metric system and 24 hour clock notation.",
    "Use conversational style.",
    "Use emojis.",
    "Translate all entries to English.",
    "The following entries consist a list of items.",
];

pub fn preamble(assistant: &AssistantConfig, today: NaiveDate) -> Vec<String> {
    let mut sections = vec![
        format!("Your name is {}.", assistant.name),
        format!("Use the following style: {}.", assistant.style),
    ];
    sections.extend(PREAMBLE.iter().map(|s| s.to_string()));
    sections.push(format!("Today is: {}", today.format("%A, %Y-%m-%d")));
    sections
}

/// Preamble plus format instructions, without the context blob.
pub fn sections(format: PromptFormat, assistant: &AssistantConfig, today: NaiveDate) -> Vec<String> {
    let mut sections = preamble(assistant, today);
    let instructions: &[&str] = match format {
        PromptFormat::Today => &[
            "Start your response with a suitable greeting and comment about today's weather \
             forecast if you have this information. Only include today's and tomorrow's \
             entries. Be verbose.",
        ],
        PromptFormat::Week => &[
            "Only include this week's entries.",
            "Compile a schedule and a summarized overview of todo's, and reminders.",
        ],
        PromptFormat::Full => &[
            "Add a quick summary of the past week's important entries. Be verbose about \
             today's entries. Add a quick summary of future important entries - one line \
             per day. Add weather information for days with outside entries.",
        ],
        PromptFormat::Custom => &[
            "Answer the questions in EmployerQuestion using the entries below.",
            "Take the ChatHistory into account; it holds the conversation so far.",
        ],
    };
    sections.extend(instructions.iter().map(|s| s.to_string()));
    sections
}

/// One exchange in a chat session.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// An entry as the LLM sees it: display date, no storage identities.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContextEntry {
    pub date: String,
    pub importance: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl ContextEntry {
    pub fn from_entry(entry: &Entry, tz: &Tz) -> Self {
        Self {
            date: entry.formatted_date(tz),
            importance: entry.importance_or_default().to_string(),
            summary: entry.summary.clone(),
            source: entry.source_name.clone(),
            metadata: entry.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PromptContext {
    pub extra_context: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chat_history: Vec<ChatTurn>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub employer_question: Vec<String>,
    pub user_data: UserData,
    pub entries: Vec<ContextEntry>,
}

impl PromptContext {
    pub fn new(config: &Config, entries: &[Entry], tz: &Tz) -> Self {
        Self {
            extra_context: config.extra_context.clone(),
            chat_history: Vec::new(),
            employer_question: Vec::new(),
            user_data: config.user_data.clone(),
            entries: entries.iter().map(|e| ContextEntry::from_entry(e, tz)).collect(),
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    #[test]
    fn test_preamble() {
        let assistant = AssistantConfig {
            name: "Jeeves".to_string(),
            style: "formal".to_string(),
        };
        let sections = preamble(&assistant, today());
        assert_eq!(sections[0], "Your name is Jeeves.");
        assert_eq!(sections[1], "Use the following style: formal.");
        assert_eq!(sections.last().unwrap(), "Today is: Monday, 2024-06-03");
    }

    #[test]
    fn test_format_sections() {
        let assistant = AssistantConfig::default();
        let week = sections(PromptFormat::Week, &assistant, today());
        assert_eq!(week.len(), preamble(&assistant, today()).len() + 2);
        assert_eq!(week.last().unwrap(), "Compile a schedule and a summarized overview of todo's, and reminders.");

        let full = sections(PromptFormat::Full, &assistant, today());
        assert!(full.last().unwrap().starts_with("Add a quick summary of the past week"));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("today".parse::<PromptFormat>().unwrap(), PromptFormat::Today);
        assert_eq!("custom".parse::<PromptFormat>().unwrap(), PromptFormat::Custom);
        let err = "monthly".parse::<PromptFormat>().unwrap_err();
        assert_eq!(err.to_string(), "unknown format: monthly");
    }

    #[test]
    fn test_context_json_shape() {
        let tz: Tz = "Europe/Brussels".parse().unwrap();
        let mut entry = Entry::new(
            DateTime::parse_from_rfc3339("2024-06-03T07:00:00Z").unwrap(),
            "Standup",
        );
        entry.source_name = Some("work".to_string());

        let mut config = Config::default();
        config.extra_context = vec!["We have a dog".to_string()];
        config.user_data.names = vec!["Alex".to_string()];

        let mut context = PromptContext::new(&config, &[entry], &tz);
        let value = context.to_value().unwrap();

        assert_eq!(value["ExtraContext"][0], "We have a dog");
        assert_eq!(value["UserData"]["Names"][0], "Alex");
        assert_eq!(value["Entries"][0]["Date"], "2024-06-03 09:00");
        assert_eq!(value["Entries"][0]["Importance"], "medium");
        assert_eq!(value["Entries"][0]["Source"], "work");
        assert!(value["Entries"][0].get("Metadata").is_none());
        assert!(value.get("ChatHistory").is_none());
        assert!(value.get("EmployerQuestion").is_none());

        context.employer_question = vec!["When is standup?".to_string()];
        context.chat_history.push(ChatTurn::user("hi"));
        let value = context.to_value().unwrap();
        assert_eq!(value["EmployerQuestion"][0], "When is standup?");
        assert_eq!(value["ChatHistory"][0]["Role"], "user");
    }
}
