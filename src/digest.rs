//! Summary generation: `spark print`, `spark chat` and `spark mail`.
//!
//! All three load the entries around today, wrap them in a
//! [`PromptContext`] and hand the prompt to the configured
//! [`Summarizer`]. Print writes the Markdown to stdout, chat keeps a
//! question/answer loop going on stdin, mail renders and sends it.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::Config;
use crate::mailer::{Mailer, Transport};
use crate::markdown;
use crate::models::EntryFilter;
use crate::prompts::{self, ChatTurn, PromptContext, PromptFormat};
use crate::store::Store;
use crate::summarizer::Summarizer;

pub const DEFAULT_DAYS_BACK: u32 = 3;
pub const DEFAULT_DAYS_AHEAD: u32 = 7;
pub const DEFAULT_SUBJECT: &str = "Daily update";

/// Load the entries in the window and build the LLM context from them.
pub async fn build_context(
    store: &dyn Store,
    config: &Config,
    tz: &Tz,
    filter: &EntryFilter,
    now: DateTime<Utc>,
) -> Result<PromptContext> {
    let entries = store.list_entries(filter, now).await?;
    tracing::debug!(entries = entries.len(), "loaded entries for summary");
    Ok(PromptContext::new(config, &entries, tz))
}

pub async fn generate(
    summarizer: &dyn Summarizer,
    config: &Config,
    format: PromptFormat,
    context: &PromptContext,
    today: NaiveDate,
) -> Result<String> {
    let sections = prompts::sections(format, &config.assistant, today);
    tracing::info!(
        llm = %summarizer.describe(),
        name = %config.assistant.name,
        entries = context.entries.len(),
        "generating summary"
    );
    summarizer.generate(&sections, &context.to_value()?).await
}

pub async fn run_print(
    summarizer: &dyn Summarizer,
    config: &Config,
    format: PromptFormat,
    mut context: PromptContext,
    questions: Vec<String>,
    today: NaiveDate,
) -> Result<()> {
    context.employer_question = questions;
    let md = generate(summarizer, config, format, &context, today).await?;
    println!("{}", md);
    Ok(())
}

/// Answer questions read line by line from `input` until `/quit` or EOF.
///
/// Each answer is written to `output` and added, with its question, to the
/// chat history sent along with the next question.
pub async fn run_chat<R, W>(
    summarizer: &dyn Summarizer,
    config: &Config,
    mut context: PromptContext,
    today: NaiveDate,
    input: R,
    output: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(output, "Enter your question. Type /quit to exit or press Ctrl+D.")?;
    let mut lines = input.lines();

    loop {
        write!(output, "> ")?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(output, "\nGoodbye!")?;
            break;
        };

        let question = line.trim();
        match question {
            "" => continue,
            "/quit" => {
                writeln!(output, "Goodbye!")?;
                break;
            }
            _ => {}
        }

        context.employer_question = vec![question.to_string()];
        let answer = generate(summarizer, config, PromptFormat::Custom, &context, today).await?;
        writeln!(output, "{}", answer)?;

        context.chat_history.push(ChatTurn::user(question));
        context.chat_history.push(ChatTurn::assistant(answer));
    }

    Ok(())
}

/// Where the body of a mail comes from.
pub enum MailBody {
    /// Markdown read from a file path or URL.
    Markdown(String),
    Generated {
        format: PromptFormat,
        context: PromptContext,
        questions: Vec<String>,
    },
}

pub async fn run_mail<T: Transport>(
    summarizer: Option<&dyn Summarizer>,
    config: &Config,
    mailer: &Mailer<T>,
    body: MailBody,
    recipients: &[String],
    subject: &str,
    today: NaiveDate,
) -> Result<()> {
    let md = match body {
        MailBody::Markdown(md) => md,
        MailBody::Generated {
            format,
            mut context,
            questions,
        } => {
            let summarizer = summarizer
                .ok_or_else(|| anyhow::anyhow!("No summarizer configured to generate the mail"))?;
            context.employer_question = questions;
            generate(summarizer, config, format, &context, today).await?
        }
    };

    let html = markdown::to_html(&md);
    mailer.send(recipients, subject, &md, &html).await
}
