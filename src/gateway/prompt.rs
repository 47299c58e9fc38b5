//! Prompt construction.

/// Instruction text placed after the fenced source.
const INSTRUCTIONS: &str = "Check for:
- Syntax errors (missing parentheses, colons, commas, typos in names)
- Undefined variables or functions
- Logic errors
- Code quality issues

Return a JSON object only:
{\"issues\": [\"error 1\", \"error 2\"], \"warnings\": [\"warning 1\"], \"suggestions\": [\"tip 1\"], \"summary\": \"text\"}";

/// Build the analysis prompt for a piece of Python source.
pub fn build_prompt(code: &str) -> String {
    format!(
        "Analyze this Python code for errors and issues:\n\n```python\n{}\n```\n\n{}",
        code, INSTRUCTIONS
    )
}
