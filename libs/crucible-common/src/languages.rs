use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Serialize;

/// Per-language execution parameters. Argument templates use the
/// placeholders `{source}` and `{output}`, substituted at job time.
#[derive(Debug, Clone)]
pub struct LanguageSpec {
    pub id: String,
    pub display_name: String,
    pub extension: String,
    /// Fixed name where the toolchain mandates one (`Main.java`),
    /// otherwise `main.<ext>`.
    pub source_file: String,
    pub is_compiled: bool,
    pub compiler: Option<PathBuf>,
    pub compile_args: Vec<String>,
    pub runtime: Option<PathBuf>,
    pub run_args: Vec<String>,
    /// Name of the compiled artifact inside the workspace.
    pub artifact: String,
    pub timeout_ms: u64,
    pub memory_limit_bytes: u64,
    pub max_processes: u32,
    /// Sandbox config template file name under the config directory.
    pub sandbox_template: String,
    /// Language-specific additions to the process environment.
    pub env: Vec<(String, String)>,
}

impl LanguageSpec {
    /// Compiler argv, placeholders expanded. None for interpreted
    /// languages.
    pub fn compile_argv(&self) -> Option<Vec<String>> {
        let compiler = self.compiler.as_ref()?;
        let mut argv = vec![compiler.to_string_lossy().into_owned()];
        argv.extend(expand_args(&self.compile_args, &self.source_file, &self.artifact));
        Some(argv)
    }

    /// Program invocation handed to the sandbox launcher after `--`.
    pub fn run_argv(&self) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(ref runtime) = self.runtime {
            argv.push(runtime.to_string_lossy().into_owned());
        }
        argv.extend(expand_args(&self.run_args, &self.source_file, &self.artifact));
        argv
    }
}

/// Expand `{source}` / `{output}` placeholders in an argument template.
pub fn expand_args(args: &[String], source: &str, output: &str) -> Vec<String> {
    args.iter()
        .map(|arg| arg.replace("{source}", source).replace("{output}", output))
        .collect()
}

/// Client-facing language record: internal paths stripped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicLanguage {
    pub name: String,
    pub extension: String,
    pub compiled: bool,
    pub timeout_ms: u64,
    pub memory_limit_mb: u64,
    pub max_processes: u32,
}

/// Read-only catalog of supported languages.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    specs: HashMap<String, LanguageSpec>,
}

const MB: u64 = 1024 * 1024;

impl LanguageRegistry {
    /// The built-in catalog. Interpreter and compiler paths assume the
    /// standard toolchains on the worker host.
    pub fn builtin() -> Self {
        let specs = [
            interpreted(
                "python",
                "Python 3",
                "py",
                "/usr/bin/python3",
                &["-u", "{source}"],
                5_000,
                256 * MB,
                4,
                &[("PYTHONDONTWRITEBYTECODE", "1")],
            ),
            interpreted(
                "javascript",
                "JavaScript (Node.js)",
                "js",
                "/usr/bin/node",
                &["{source}"],
                5_000,
                256 * MB,
                8,
                &[],
            ),
            compiled(
                "c",
                "C (GCC)",
                "c",
                "/usr/bin/gcc",
                &["{source}", "-O2", "-std=c17", "-o", "{output}"],
                None,
                &["./{output}"],
                "main",
                3_000,
                256 * MB,
                4,
            ),
            compiled(
                "cpp",
                "C++ (G++)",
                "cpp",
                "/usr/bin/g++",
                &["{source}", "-O2", "-std=c++20", "-o", "{output}"],
                None,
                &["./{output}"],
                "main",
                3_000,
                256 * MB,
                4,
            ),
            compiled(
                "java",
                "Java (OpenJDK)",
                "java",
                "/usr/bin/javac",
                &["{source}"],
                Some("/usr/bin/java"),
                &["-XX:ActiveProcessorCount=1", "-cp", ".", "Main"],
                "Main.class",
                8_000,
                512 * MB,
                64,
            ),
        ]
        .into_iter()
        .map(|spec| (spec.id.clone(), spec))
        .collect();

        Self { specs }
    }

    pub fn has(&self, id: &str) -> bool {
        self.specs.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&LanguageSpec> {
        self.specs.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.specs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Map served by the `list-languages` endpoint. BTreeMap keeps the
    /// payload stable across calls.
    pub fn public_view(&self) -> BTreeMap<String, PublicLanguage> {
        self.specs
            .iter()
            .map(|(id, spec)| {
                (
                    id.clone(),
                    PublicLanguage {
                        name: spec.display_name.clone(),
                        extension: spec.extension.clone(),
                        compiled: spec.is_compiled,
                        timeout_ms: spec.timeout_ms,
                        memory_limit_mb: spec.memory_limit_bytes / MB,
                        max_processes: spec.max_processes,
                    },
                )
            })
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn interpreted(
    id: &str,
    display_name: &str,
    extension: &str,
    runtime: &str,
    run_args: &[&str],
    timeout_ms: u64,
    memory_limit_bytes: u64,
    max_processes: u32,
    env: &[(&str, &str)],
) -> LanguageSpec {
    LanguageSpec {
        id: id.to_string(),
        display_name: display_name.to_string(),
        extension: extension.to_string(),
        source_file: format!("main.{}", extension),
        is_compiled: false,
        compiler: None,
        compile_args: Vec::new(),
        runtime: Some(PathBuf::from(runtime)),
        run_args: run_args.iter().map(|s| s.to_string()).collect(),
        artifact: String::new(),
        timeout_ms,
        memory_limit_bytes,
        max_processes,
        sandbox_template: format!("{}.cfg", id),
        env: env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

#[allow(clippy::too_many_arguments)]
fn compiled(
    id: &str,
    display_name: &str,
    extension: &str,
    compiler: &str,
    compile_args: &[&str],
    runtime: Option<&str>,
    run_args: &[&str],
    artifact: &str,
    timeout_ms: u64,
    memory_limit_bytes: u64,
    max_processes: u32,
) -> LanguageSpec {
    let source_file = if id == "java" {
        "Main.java".to_string()
    } else {
        format!("main.{}", extension)
    };
    LanguageSpec {
        id: id.to_string(),
        display_name: display_name.to_string(),
        extension: extension.to_string(),
        source_file,
        is_compiled: true,
        compiler: Some(PathBuf::from(compiler)),
        compile_args: compile_args.iter().map(|s| s.to_string()).collect(),
        runtime: runtime.map(PathBuf::from),
        run_args: run_args.iter().map(|s| s.to_string()).collect(),
        artifact: artifact.to_string(),
        timeout_ms,
        memory_limit_bytes,
        max_processes,
        sandbox_template: format!("{}.cfg", id),
        env: Vec::new(),
    }
}
