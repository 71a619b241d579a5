//! Prompt text and the three generation calls built on it.

use std::time::Instant;

use super::client::CompletionModel;
use super::structured::{self, GeneratedAnswer, GeneratedQuery, GeneratedQuestion};
use crate::error::Result;

const NO_PREVIOUS_QUESTIONS: &str = "No previous questions.";

pub fn sql_prompt(schema_text: &str, question: &str) -> String {
    format!(
        r#"### Instructions:
You are an expert SQL query generator specializing in PostgreSQL. Analyze a natural language question and generate a precise, executable SQL SELECT query that answers it, based solely on the provided database schema.

Key Rules:
- Return only ONE SQL query. It must be read-only: SELECT or WITH ... SELECT. Never modify data.
- Use PostgreSQL syntax (double quotes for identifiers that need quoting, date_trunc / interval for dates).
- Do not invent column names, data types, table names or relationships. Use only the schema provided.
- Handle NULLs, aggregations, date filtering and sorting where the question implies them.
- Keep the query simple and direct. The result set is passed to an analysis step, so avoid needless UNIONs and subqueries.
- Add a LIMIT when the question asks for a listing rather than an aggregate.

### Input:
Generate a SQL query that answers the question `{question}`.

Schema:
{schema_text}

### Response format:
Respond only with a JSON object of the form {{"sql_query": "<the query>"}} and nothing else."#
    )
}

pub fn answer_prompt(question: &str, sql: &str, results_markdown: &str) -> String {
    format!(
        r#"### Input:
The question: {question}

The database query:
{sql}

The database results:
{results_markdown}

Note:
Give a brief answer to the question with this provided info. If the results are empty, say so.
Respond only with a JSON object of the form {{"answer": "<your answer>"}}."#
    )
}

pub fn question_prompt(schema_text: &str, sample_data: &str, previous_questions: &[String]) -> String {
    let old_questions = if previous_questions.is_empty() {
        NO_PREVIOUS_QUESTIONS.to_string()
    } else {
        previous_questions
            .iter()
            .map(|q| format!("- {}", q))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are an expert data explorer uncovering KPIs, metrics and actionable business insights from a database. Generate exactly one novel natural-language question that probes the database for trends, correlations, anomalies, summaries or comparisons that could inform business decisions.

### Database Schema:
{schema_text}

### Sample Data:
{sample_data}

### Previous Questions:
{old_questions}

### Guidelines:
- Avoid semantic overlap with the previous questions: no repeated KPIs, groupings, timeframes or entity combinations.
- Target an underrepresented theme or a fresh combination of schema elements.
- Phrase it in clear English as if asking a colleague, one sentence, without naming tables or columns.
- It must be answerable by a single SQL query over this schema.

### Output Format:
Respond only with a JSON object of the form {{"question": "<your question>"}}."#
    )
}

/// Ask the model for one read-only query answering `question`.
pub async fn generate_sql(
    model: &dyn CompletionModel,
    schema_text: &str,
    question: &str,
) -> Result<GeneratedQuery> {
    let started = Instant::now();
    let raw = model.complete(&sql_prompt(schema_text, question), true).await?;
    let query: GeneratedQuery = structured::parse(&raw)?;
    log::info!(
        "Generated SQL with {} in {:.2}s",
        model.model_name(),
        started.elapsed().as_secs_f64()
    );
    Ok(query)
}

pub async fn generate_answer(
    model: &dyn CompletionModel,
    question: &str,
    sql: &str,
    results_markdown: &str,
) -> Result<GeneratedAnswer> {
    let started = Instant::now();
    let raw = model
        .complete(&answer_prompt(question, sql, results_markdown), true)
        .await?;
    let answer: GeneratedAnswer = structured::parse(&raw)?;
    log::info!(
        "Generated answer with {} in {:.2}s",
        model.model_name(),
        started.elapsed().as_secs_f64()
    );
    Ok(answer)
}

pub async fn generate_question(
    model: &dyn CompletionModel,
    schema_text: &str,
    sample_data: &str,
    previous_questions: &[String],
) -> Result<GeneratedQuestion> {
    let prompt = question_prompt(schema_text, sample_data, previous_questions);
    let raw = model.complete(&prompt, true).await?;
    structured::parse(&raw)
}
