//! # Default Task Prompts
//!
//! The served adapter was fine-tuned on this instruction/input/response layout,
//! one-shot example included. Keep it byte-for-byte; use `prompt_template` in
//! `config.yml` to experiment.

// --- SQL Generation ---

/// Placeholders: `{question}`, `{schema}`
pub const SQL_GENERATION_PROMPT: &str = r#"Below is an instruction that describes a task, paired with an input that provides further context. Write a response that appropriately completes the request.

### Instruction:
Convert the following question to a SQL query for a SQLite database. Only output the SQL query, nothing else.

Example:
Question: How many products are there?
SQL: SELECT COUNT(*) FROM products

Question: {question}

### Input:
Database schema:
{schema}

### Response:
"#;

