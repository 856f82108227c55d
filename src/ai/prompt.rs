/// Fills the fixed instruction template. The schema and the request are
/// inserted verbatim; the request is not escaped.
pub fn build_prompt(dialect: &str, user_request: &str, schema: &str) -> String {
    format!(
        "\nYou are an expert {dialect} query generator.\n\n\
         Here is the database schema:\n{schema}\n\n\
         Based on the above schema and table samples, generate the SQL query for this request:\n\n\
         \"\"\"{user_request}\"\"\"\n\n\
         Only return the SQL query, no explanation or formatting.\n"
    )
}
