//! Privacy enforcement must hold for every serializer style.

mod common;

use common::context_with;
use dfchat::config::{PipelineConfig, SerializerType};
use dfchat::prompt::build_chat_prompt;

/// Every literal cell value of the sample dataset.
const SAMPLE_LITERALS: &[&str] = &[
    "United States",
    "France",
    "Japan",
    "19294482071552",
    "2411255037952",
    "4380756541440",
    "6.94",
    "6.66",
    "5.87",
];

#[test]
fn privacy_on_no_sample_value_leaks_for_any_serializer() {
    for serializer in [SerializerType::Csv, SerializerType::Yml, SerializerType::Json] {
        let mut config = PipelineConfig::default();
        config.enforce_privacy = true;
        config.serializer = serializer;
        let ctx = context_with(config);

        let prompt = build_chat_prompt(&ctx, "What is the average gdp?", None).unwrap();
        for literal in SAMPLE_LITERALS {
            assert!(
                !prompt.contains(literal),
                "{} leaked into the prompt with serializer {:?}",
                literal,
                serializer
            );
        }
        assert!(!prompt.contains("samples"));
        // schema survives
        assert!(prompt.contains("gdp (int64)"));
    }
}

#[test]
fn privacy_off_schema_and_samples_present_for_any_serializer() {
    for serializer in [SerializerType::Csv, SerializerType::Yml, SerializerType::Json] {
        let mut config = PipelineConfig::default();
        config.enforce_privacy = false;
        config.serializer = serializer;
        let ctx = context_with(config);

        let prompt = build_chat_prompt(&ctx, "What is the average gdp?", None).unwrap();
        assert!(prompt.contains("dfs[0]"));
        assert!(prompt.contains("samples"));
        assert!(
            prompt.contains("United States"),
            "sample row missing with serializer {:?}",
            serializer
        );
    }
}

#[test]
fn direct_sql_mode_still_respects_privacy() {
    let mut config = PipelineConfig::default();
    config.enforce_privacy = true;
    config.direct_sql = true;
    let ctx = context_with(config);

    let prompt = build_chat_prompt(&ctx, "total gdp", None).unwrap();
    assert!(prompt.contains("execute_sql_query"));
    for literal in SAMPLE_LITERALS {
        assert!(!prompt.contains(literal));
    }
}
