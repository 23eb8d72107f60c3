// src/external.rs - Blocking invocation of the pose-model scripts
use crate::config::StageConfig;
use crate::error::{Error, Result};
use std::process::Command;
use tracing::{debug, info, warn};

// One external command of the chunked pipeline, run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalStage {
    pub description: String,
    pub program: String,
    pub args: Vec<String>,
}

// Replaces every `{name}` in `template` with its value.
pub fn expand_placeholders(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

impl ExternalStage {
    pub fn new(
        description: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            description: description.into(),
            program: program.into(),
            args,
        }
    }

    pub fn from_config(stage: &StageConfig, vars: &[(&str, &str)]) -> Self {
        Self {
            description: stage.description.clone(),
            program: expand_placeholders(&stage.program, vars),
            args: stage
                .args
                .iter()
                .map(|arg| expand_placeholders(arg, vars))
                .collect(),
        }
    }

    // Runs the command and returns its stdout. A non-zero exit fails with
    // the captured stderr.
    pub fn run(&self) -> Result<String> {
        info!(stage = %self.description, program = %self.program, "running stage");

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| Error::io(&self.program, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stdout.lines() {
            debug!(stage = %self.description, "{line}");
        }

        if !output.status.success() {
            return Err(Error::StageFailed {
                description: self.description.clone(),
                code: output.status.code(),
                stderr,
            });
        }
        if !stderr.trim().is_empty() {
            warn!(stage = %self.description, "{}", stderr.trim_end());
        }

        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_placeholders() {
        let vars = [("chunk_dir", "/tmp/out"), ("video_filename_base", "clip")];
        assert_eq!(
            expand_placeholders("{chunk_dir}/{video_filename_base}_chunk0.json", &vars),
            "/tmp/out/clip_chunk0.json"
        );
        assert_eq!(expand_placeholders("--fps {fps}", &vars), "--fps {fps}");
    }

    #[test]
    fn test_from_config_substitutes_args() {
        let stage = StageConfig {
            description: "uplift".to_string(),
            program: "python".to_string(),
            args: vec!["uplift.py".to_string(), "{chunk_dir}".to_string()],
        };
        let stage = ExternalStage::from_config(&stage, &[("chunk_dir", "work")]);
        assert_eq!(stage.args, vec!["uplift.py", "work"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_stdout() {
        let stage = ExternalStage::new("echo", "sh", vec!["-c".into(), "echo hello".into()]);
        assert_eq!(stage.run().unwrap(), "hello\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_stage_failure() {
        let stage = ExternalStage::new(
            "failing model",
            "sh",
            vec!["-c".into(), "echo broken >&2; exit 3".into()],
        );
        match stage.run() {
            Err(Error::StageFailed {
                description,
                code,
                stderr,
            }) => {
                assert_eq!(description, "failing model");
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "broken");
            }
            other => panic!("expected stage failure, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let stage = ExternalStage::new("ghost", "pose2bvh-no-such-program", Vec::new());
        assert!(matches!(stage.run(), Err(Error::Io { .. })));
    }
}
