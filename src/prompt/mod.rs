//! Prompt assembly: dataframe previews, template selection, self-correction.

use anyhow::Result;
use serde_json::Value;

use crate::config::SerializerType;
use crate::context::ChatContext;
use crate::dataframe::DataFrame;
use crate::sandbox::DEFAULT_WHITELIST;

/// Structured description of a failed attempt, fed back into the next
/// prompt build to drive self-correction.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub code: String,
    pub kind: String,
    pub message: String,
}

/// Build the full instruction text for one generation attempt.
///
/// Template selection follows the config: `direct_sql` swaps in the SQL
/// helper contract, `enforce_privacy` drops every sample row. When
/// `error_context` is present the failing code and error are embedded and
/// the model is asked for a corrected script.
pub fn build_chat_prompt(
    context: &ChatContext,
    query: &str,
    error_context: Option<&ErrorContext>,
) -> Result<String> {
    let mut out = String::new();

    out.push_str(
        "You are a data analysis assistant working with pandas dataframes.\n\
         The following dataframes are available in a list named `dfs`:\n\n",
    );

    for (i, df) in context.dataframes().iter().enumerate() {
        out.push_str(&serialize_dataframe(
            df,
            i,
            context.config.serializer,
            context.config.enforce_privacy,
        )?);
        out.push('\n');
    }

    if !context.memory.is_empty() {
        out.push_str("Conversation so far:\n");
        for entry in context.memory.entries() {
            out.push_str(&format!("Q: {}\nA: {}\n", entry.query, entry.message));
        }
        out.push('\n');
    }

    out.push_str(&format!("Question: {}\n\n", query));

    if context.config.direct_sql {
        out.push_str(
            "A helper is already defined for data access:\n\
                 def execute_sql_query(sql_query: str) -> pd.DataFrame\n\
             Use execute_sql_query(...) to read the data instead of touching `dfs` directly.\n\
             Table names match the dataframe names listed above.\n\n",
        );
    }

    let mut allowed: Vec<&str> = DEFAULT_WHITELIST.to_vec();
    for dep in &context.config.custom_whitelisted_dependencies {
        allowed.push(dep.as_str());
    }
    out.push_str(&format!(
        "Write Python code that answers the question. Allowed imports: {}.\n\
         Do not read or write files and do not use the network.\n\
         At the end assign the answer to a variable named `result`:\n\
             result = {{\"type\": ..., \"value\": ...}}\n\
         where \"type\" is one of \"string\", \"number\", \"dataframe\" or \"plot\".\n\
         For \"plot\", save the chart as a .png and set \"value\" to its file path.\n\
         Return only plain Python code without Markdown formatting.\n",
        allowed.join(", ")
    ));

    if let Some(err) = error_context {
        out.push_str(&format!(
            "\nYour previous code failed.\n\
             Code:\n{}\n\
             Error ({}): {}\n\
             Return a full corrected script that fixes this error and still follows the result contract.\n",
            err.code, err.kind, err.message
        ));
    }

    Ok(out)
}

/// Render one dataframe entry, headed `dfs[i]`, deterministically.
///
/// With privacy enforcement the sample block is never rendered, so no cell
/// value can reach the prompt by construction.
pub fn serialize_dataframe(
    df: &DataFrame,
    index: usize,
    serializer: SerializerType,
    enforce_privacy: bool,
) -> Result<String> {
    let schema = df.schema()?;
    let mut out = format!("dfs[{}]:{}x{}\n", index, df.rows_count()?, schema.len());
    out.push_str(&format!("name: {}\n", df.name));
    if let Some(desc) = &df.description {
        out.push_str(&format!("description: {}\n", desc));
    }
    let cols = schema
        .iter()
        .map(|c| format!("{} ({})", c.name, c.dtype))
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&format!("columns: {}\n", cols));

    if !enforce_privacy {
        let head = df.head(5)?;
        out.push_str("samples:\n");
        out.push_str(&serialize_head(&head, serializer)?);
    }

    Ok(out)
}

fn serialize_head(head: &crate::dataframe::TableData, serializer: SerializerType) -> Result<String> {
    match serializer {
        SerializerType::Csv => {
            let mut s = head.column_names().join(",");
            s.push('\n');
            for row in &head.rows {
                let line = row.iter().map(value_to_string).collect::<Vec<_>>().join(",");
                s.push_str(&line);
                s.push('\n');
            }
            Ok(s)
        }
        SerializerType::Yml => {
            let value = serde_json::json!({
                "columns": head.column_names(),
                "rows": head.rows,
            });
            Ok(serde_yaml::to_string(&value)?)
        }
        SerializerType::Json => {
            let records: Vec<serde_json::Map<String, Value>> = head
                .rows
                .iter()
                .map(|row| {
                    head.columns
                        .iter()
                        .zip(row.iter())
                        .map(|(c, v)| (c.name.clone(), v.clone()))
                        .collect()
                })
                .collect();
            let mut s = serde_json::to_string_pretty(&records)?;
            s.push('\n');
            Ok(s)
        }
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CodeCache;
    use crate::config::PipelineConfig;
    use crate::dataframe::table_from_columns;
    use serde_json::json;

    fn sample_df(name: &str) -> DataFrame {
        let data = table_from_columns(vec![
            ("country", vec![json!("United States"), json!("France")]),
            ("gdp", vec![json!(19294482071552i64), json!(2411255037952i64)]),
        ]);
        DataFrame::new(name, data)
    }

    fn context_with(config: PipelineConfig) -> ChatContext {
        ChatContext::new(
            vec![sample_df("countries"), sample_df("regions")],
            config,
            CodeCache::disabled(),
        )
    }

    #[test]
    fn privacy_omits_every_sample_value() {
        let mut config = PipelineConfig::default();
        config.enforce_privacy = true;
        let ctx = context_with(config);
        let prompt = build_chat_prompt(&ctx, "What is the average gdp?", None).unwrap();
        assert!(!prompt.contains("samples"));
        assert!(!prompt.contains("United States"));
        assert!(!prompt.contains("19294482071552"));
        // schema still present
        assert!(prompt.contains("country (object)"));
        assert!(prompt.contains("gdp (int64)"));
    }

    #[test]
    fn without_privacy_samples_appear_in_dataset_order() {
        let ctx = context_with(PipelineConfig::default());
        let prompt = build_chat_prompt(&ctx, "What is the average gdp?", None).unwrap();
        let first = prompt.find("dfs[0]").unwrap();
        let second = prompt.find("dfs[1]").unwrap();
        assert!(first < second);
        assert!(prompt.contains("samples"));
        assert!(prompt.contains("United States"));
    }

    #[test]
    fn sql_mode_declares_the_helper() {
        let mut config = PipelineConfig::default();
        config.direct_sql = true;
        let ctx = context_with(config);
        let prompt = build_chat_prompt(&ctx, "total gdp", None).unwrap();
        assert!(prompt.contains("execute_sql_query(sql_query: str) -> pd.DataFrame"));
    }

    #[test]
    fn result_contract_is_always_declared() {
        let ctx = context_with(PipelineConfig::default());
        let prompt = build_chat_prompt(&ctx, "total gdp", None).unwrap();
        assert!(prompt.contains("result = {\"type\": ..., \"value\": ...}"));
        assert!(prompt.contains("\"dataframe\" or \"plot\""));
    }

    #[test]
    fn error_context_embeds_code_and_error() {
        let ctx = context_with(PipelineConfig::default());
        let err = ErrorContext {
            code: "result = dfs[0]['gdp'].meen()".into(),
            kind: "AttributeError".into(),
            message: "'Series' object has no attribute 'meen'".into(),
        };
        let prompt = build_chat_prompt(&ctx, "average gdp", Some(&err)).unwrap();
        assert!(prompt.contains("meen()"));
        assert!(prompt.contains("AttributeError"));
        assert!(prompt.contains("previous code failed"));
    }

    #[test]
    fn custom_dependencies_are_offered() {
        let mut config = PipelineConfig::default();
        config.custom_whitelisted_dependencies = vec!["scipy".into()];
        let ctx = context_with(config);
        let prompt = build_chat_prompt(&ctx, "fit a curve", None).unwrap();
        assert!(prompt.contains("scipy"));
    }

    #[test]
    fn memory_feeds_follow_up_prompts() {
        let mut ctx = context_with(PipelineConfig::default());
        ctx.memory.add("What is the average gdp?", "10852868554752", true);
        let prompt = build_chat_prompt(&ctx, "And the maximum?", None).unwrap();
        assert!(prompt.contains("Q: What is the average gdp?"));
        assert!(prompt.contains("A: 10852868554752"));
    }

    #[test]
    fn yml_serializer_renders_yaml() {
        let df = sample_df("countries");
        let s = serialize_dataframe(&df, 0, SerializerType::Yml, false).unwrap();
        assert!(s.contains("columns:"));
        assert!(s.contains("- country"));
    }

    #[test]
    fn json_serializer_renders_records() {
        let df = sample_df("countries");
        let s = serialize_dataframe(&df, 0, SerializerType::Json, false).unwrap();
        assert!(s.contains("\"country\": \"United States\""));
    }
}
