#[cfg(test)]
pub mod test {
    use serde_json::json;

    use crate::config::Config;
    use crate::env::Environment;
    use crate::format::{Format, load_str};
    use crate::schema::Schema;
    use crate::types::Native;

    /// A sectioned experiment document: `gpu` inherits `default`, `debug`
    /// deletes the model depth.
    pub const DOCUMENT: &str = r#"
default:
  name: experiment
  train: ["2020"]
  data_dir: ${$DATA_DIR}
  output: ${.data_dir}/${.name}
  model:
    name: RF
    depth: "8"
    file: ${.name}_${..name}.pkl
gpu:
  sectfig.patch: default
  device: cuda
  model:
    depth: 16
debug:
  model:
    depth: \
"#;

    pub const DEFINITIONS: &str = r#"
.name:
  dtype: str
  sdesc: Experiment name
.train:
  dtype: list
  required: true
  sdesc: Training years
  items:
    dtype: str
.test:
  dtype: list
  default: [2022]
  sdesc: Test years
.data_dir:
  dtype: path
  default: /tmp
.output:
  dtype: path
.device:
  dtype: str
  default: cpu
  checks:
    - oneof: [cpu, cuda]
.model:
  sdesc: Model settings
  .name:
    dtype: str
    sdesc: Estimator family
    ldesc: RF for random forest, NN for a neural network.
    checks:
      - oneof: [RF, NN]
  .depth:
    dtype: int
    default: 4
    checks:
      - between: {lower: 1, upper: 32, inclusive: both}
  .file:
    dtype: str
"#;

    fn origin() -> std::path::PathBuf {
        std::path::PathBuf::from("fixture.yml")
    }

    pub fn document() -> Native {
        load_str(DOCUMENT, Format::Yaml, &origin()).unwrap()
    }

    pub fn definitions() -> Native {
        load_str(DEFINITIONS, Format::Yaml, &origin()).unwrap()
    }

    pub fn schema() -> Schema {
        Schema::from_native(&definitions()).unwrap()
    }

    pub fn env() -> Environment {
        Environment::fixed([("DATA_DIR".to_string(), "/data".to_string())])
    }

    /// The `default` section as a plain configuration, without definitions.
    pub fn default_section() -> Config {
        let section = document()["default"].clone();
        Config::from_native(section).unwrap().with_env(env())
    }

    #[test]
    fn fixtures_parse() {
        let doc = document();
        assert_eq!(doc["debug"]["model"]["depth"], json!("\\"));
        assert_eq!(doc["default"]["model"]["depth"], json!("8"));
        assert!(schema().child("model").unwrap().is_mapping());
    }

    #[test]
    fn default_section_resolves() {
        let config = default_section();
        assert_eq!(config.value("output").unwrap(), json!("/data/experiment"));
        assert_eq!(config.value("model.file").unwrap(), json!("RF_experiment.pkl"));
    }
}
