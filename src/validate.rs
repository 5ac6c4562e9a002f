//! Post-generation validation.
//!
//! Runs against what actually landed on disk, not against what the pipeline
//! believes it wrote: layout, manifest, Python well-formedness, and the
//! import audit each re-read the final package directory. The audit is the
//! load-bearing check; a stub import the assembler failed to rewrite would
//! otherwise surface as an ImportError on the consumer's machine.
//!
//! Well-formedness is a lexical scan (terminated strings, balanced
//! brackets), not a parse. It exists to catch truncated or corrupted output
//! files; full syntax checking belongs to the Python toolchain that
//! eventually imports the package.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::assemble::PackageLayout;
use crate::catalog::{PackageSpec, Role};
use crate::codegen::manifest::{self, PyProject};
use crate::config::BuildConfig;
use crate::error::{BrokkrError, Result};

/// Import roots always available to generated code.
const STDLIB_ROOTS: &[&str] = &[
    "abc",
    "argparse",
    "asyncio",
    "base64",
    "collections",
    "concurrent",
    "contextlib",
    "dataclasses",
    "datetime",
    "enum",
    "functools",
    "io",
    "itertools",
    "json",
    "logging",
    "math",
    "os",
    "pathlib",
    "queue",
    "re",
    "signal",
    "socket",
    "sys",
    "threading",
    "time",
    "types",
    "typing",
    "unittest",
    "uuid",
    "warnings",
    "weakref",
];

/// One problem found in a generated package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Path relative to the package directory.
    pub file: PathBuf,
    /// 1-based line, when the problem is tied to one.
    pub line: Option<usize>,
    pub detail: String,
}

impl Violation {
    fn file_level(file: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            detail: detail.into(),
        }
    }

    fn at_line(file: impl Into<PathBuf>, line: usize, detail: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.file.display(), line, self.detail),
            None => write!(f, "{}: {}", self.file.display(), self.detail),
        }
    }
}

/// Validate one assembled package in place. Violations are collected, not
/// short-circuited, so one run reports everything wrong with the package.
pub async fn validate_package(
    spec: &PackageSpec,
    dir: &Path,
    config: &BuildConfig,
) -> Result<()> {
    let violations = collect_violations(spec, dir, config).await?;
    if violations.is_empty() {
        debug!(package = %spec.name(), "validation clean");
        return Ok(());
    }

    let details = render_details(&violations);
    Err(BrokkrError::Validation {
        package: spec.name(),
        count: violations.len(),
        details,
    })
}

async fn collect_violations(
    spec: &PackageSpec,
    dir: &Path,
    config: &BuildConfig,
) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();

    violations.extend(check_layout(spec, dir));
    let allowed_external = check_manifest(spec, dir, &config.package_version, &mut violations).await;
    violations.extend(check_wrapper_exports(spec, dir).await);

    let package = spec.name();
    let module_dir = dir.join(&package);
    for stub in walk_python_files(dir) {
        let text = match tokio::fs::read_to_string(dir.join(&stub)).await {
            Ok(text) => text,
            Err(err) => {
                violations.push(Violation::file_level(&stub, format!("unreadable: {err}")));
                continue;
            }
        };
        let scan = scan_python(&text);
        for (line, detail) in &scan.violations {
            violations.push(Violation::at_line(&stub, *line, detail.clone()));
        }
        violations.extend(audit_imports(&package, &stub, &text, &scan, &allowed_external));
    }

    if !module_dir.is_dir() {
        violations.push(Violation::file_level(
            PathBuf::from(&package),
            "module directory missing",
        ));
    }

    Ok(violations)
}

fn render_details(violations: &[Violation]) -> String {
    let mut shown: Vec<String> = violations.iter().take(3).map(|v| v.to_string()).collect();
    if violations.len() > shown.len() {
        shown.push(format!("and {} more", violations.len() - shown.len()));
    }
    shown.join("; ")
}

// ── layout ──────────────────────────────────────────────────────────

/// Every planned file must exist; no Python file outside the plan may.
fn check_layout(spec: &PackageSpec, dir: &Path) -> Vec<Violation> {
    let mut violations = Vec::new();
    let planned: HashSet<PathBuf> = PackageLayout::new(spec).planned_files().into_iter().collect();

    for rel in &planned {
        if !dir.join(rel).is_file() {
            violations.push(Violation::file_level(rel.clone(), "declared file missing"));
        }
    }

    for rel in walk_python_files(dir) {
        if !planned.contains(&rel) {
            violations.push(Violation::file_level(rel, "unexpected Python file"));
        }
    }

    violations
}

/// All `.py` files under `dir`, as sorted paths relative to it.
fn walk_python_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "py")
        })
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(dir)
                .map(Path::to_path_buf)
                .ok()
        })
        .collect();
    files.sort();
    files
}

// ── manifest ────────────────────────────────────────────────────────

/// Parse and cross-check `pyproject.toml`. Returns the import roots the
/// manifest's dependencies provide, falling back to the synthesized set when
/// the manifest cannot be read, so the import audit still runs.
async fn check_manifest(
    spec: &PackageSpec,
    dir: &Path,
    expected_version: &str,
    violations: &mut Vec<Violation>,
) -> HashSet<String> {
    let manifest_file = PathBuf::from("pyproject.toml");
    let fallback: HashSet<String> = external_roots(&manifest::runtime_dependencies());

    let text = match tokio::fs::read_to_string(dir.join(&manifest_file)).await {
        Ok(text) => text,
        Err(err) => {
            violations.push(Violation::file_level(manifest_file, format!("unreadable: {err}")));
            return fallback;
        }
    };
    let parsed: PyProject = match toml::from_str(&text) {
        Ok(parsed) => parsed,
        Err(err) => {
            violations.push(Violation::file_level(manifest_file, format!("unparseable: {err}")));
            return fallback;
        }
    };

    if parsed.project.name != spec.name() {
        violations.push(Violation::file_level(
            &manifest_file,
            format!(
                "project name {:?} does not match package {:?}",
                parsed.project.name,
                spec.name()
            ),
        ));
    }
    if parsed.project.version != expected_version {
        violations.push(Violation::file_level(
            &manifest_file,
            format!(
                "version {:?} does not match configured {expected_version:?}",
                parsed.project.version
            ),
        ));
    }
    if !dir.join(&parsed.project.readme).is_file() {
        violations.push(Violation::file_level(
            &manifest_file,
            format!("readme {:?} does not exist", parsed.project.readme),
        ));
    }
    if parsed.build_system.build_backend != manifest::BUILD_BACKEND {
        violations.push(Violation::file_level(
            &manifest_file,
            format!("unexpected build backend {:?}", parsed.build_system.build_backend),
        ));
    }
    if parsed.project.requires_python.trim().is_empty() {
        violations.push(Violation::file_level(&manifest_file, "requires-python is empty"));
    }

    for runtime in ["grpcio", "protobuf"] {
        match parsed
            .project
            .dependencies
            .iter()
            .find(|dep| manifest::requirement_name(dep) == runtime)
        {
            Some(dep) if dep.contains(">=") => {}
            Some(dep) => violations.push(Violation::file_level(
                &manifest_file,
                format!("dependency {dep:?} is not a minimum-version floor"),
            )),
            None => violations.push(Violation::file_level(
                &manifest_file,
                format!("missing runtime dependency {runtime}"),
            )),
        }
    }

    external_roots(&parsed.project.dependencies)
}

fn external_roots(dependencies: &[String]) -> HashSet<String> {
    dependencies
        .iter()
        .flat_map(|dep| manifest::import_roots(manifest::requirement_name(dep)))
        .map(|root| root.to_string())
        .collect()
}

// ── wrapper exports ─────────────────────────────────────────────────

/// The names `__init__.py` re-exports must be defined in the wrapper.
async fn check_wrapper_exports(spec: &PackageSpec, dir: &Path) -> Vec<Violation> {
    let wrapper_rel = Path::new(&spec.name()).join(spec.wrapper_file());
    let text = match tokio::fs::read_to_string(dir.join(&wrapper_rel)).await {
        // layout check already reported the missing file
        Err(_) => return Vec::new(),
        Ok(text) => text,
    };

    let mut violations = Vec::new();
    let expected: Vec<String> = match spec.role {
        Role::Client => vec![format!("class {}Client", spec.service.name)],
        Role::Server => vec![
            format!("class {}Servicer", spec.service.name),
            "def serve(".to_string(),
        ],
    };
    for needle in expected {
        if !text.contains(&needle) {
            violations.push(Violation::file_level(
                &wrapper_rel,
                format!("expected definition not found: {needle}"),
            ));
        }
    }
    violations
}

// ── lexical scan ────────────────────────────────────────────────────

/// Result of scanning one Python source: lexical problems plus, per line,
/// whether a statement could legally begin there (outside any string,
/// bracket nesting, or backslash continuation). The import audit only looks
/// at those lines, which keeps descriptor byte blobs and docstrings from
/// producing false positives.
pub struct PythonScan {
    pub violations: Vec<(usize, String)>,
    statement_start: Vec<bool>,
}

impl PythonScan {
    pub fn starts_statement(&self, line: usize) -> bool {
        self.statement_start.get(line - 1).copied().unwrap_or(false)
    }
}

/// String-and-comment-aware scan for unterminated literals and unbalanced
/// brackets.
pub fn scan_python(source: &str) -> PythonScan {
    let mut violations = Vec::new();
    let mut statement_start = Vec::new();
    let mut stack: Vec<(char, usize)> = Vec::new();

    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Str { quote: char, triple: bool, opened: usize },
    }
    let mut state = State::Code;
    let mut continuation = false;

    let chars: Vec<char> = source.chars().collect();
    let mut line = 1;
    let mut i = 0;

    statement_start.push(true);

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            match state {
                State::Code => {
                    statement_start.push(stack.is_empty() && !continuation);
                }
                // a single-quoted string cannot span a raw newline
                State::Str { triple: false, opened, .. } => {
                    violations.push((opened, "unterminated string literal".to_string()));
                    state = State::Code;
                    statement_start.push(stack.is_empty());
                }
                State::Str { triple: true, .. } => statement_start.push(false),
            }
            line += 1;
            continuation = false;
            i += 1;
            continue;
        }

        match state {
            State::Code => match c {
                '#' => {
                    while i < chars.len() && chars[i] != '\n' {
                        i += 1;
                    }
                    continue;
                }
                '\'' | '"' => {
                    let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                    state = State::Str {
                        quote: c,
                        triple,
                        opened: line,
                    };
                    i += if triple { 3 } else { 1 };
                    continue;
                }
                '(' | '[' | '{' => stack.push((c, line)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        Some((open, opened)) => violations.push((
                            line,
                            format!("mismatched {c:?} closing {open:?} from line {opened}"),
                        )),
                        None => violations.push((line, format!("unmatched {c:?}"))),
                    }
                }
                '\\' if chars.get(i + 1) == Some(&'\n') => {
                    continuation = true;
                }
                _ => {}
            },
            State::Str { quote, triple, .. } => {
                if c == '\\' {
                    // skip the escaped character, even across a newline
                    if chars.get(i + 1) == Some(&'\n') {
                        line += 1;
                        statement_start.push(false);
                    }
                    i += 2;
                    continue;
                }
                if c == quote {
                    let closes = if triple {
                        chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote)
                    } else {
                        true
                    };
                    if closes {
                        i += if triple { 3 } else { 1 };
                        state = State::Code;
                        continue;
                    }
                }
            }
        }

        i += 1;
    }

    if let State::Str { opened, .. } = state {
        violations.push((opened, "unterminated string literal".to_string()));
    }
    for (open, opened) in stack {
        violations.push((opened, format!("unclosed {open:?}")));
    }

    PythonScan {
        violations,
        statement_start,
    }
}

// ── import audit ────────────────────────────────────────────────────

/// Check every import statement against what the package can actually
/// provide: itself, the standard library, or an import root granted by a
/// manifest dependency. A bare sibling stub import is the signature of a
/// missed rewrite and is called out as such.
fn audit_imports(
    package: &str,
    file: &Path,
    text: &str,
    scan: &PythonScan,
    allowed_external: &HashSet<String>,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if !scan.starts_statement(line_no) {
            continue;
        }
        let stmt = raw_line.trim_start();

        let roots: Vec<&str> = if let Some(rest) = stmt.strip_prefix("from ") {
            match rest.split_whitespace().next() {
                // relative imports stay inside the package
                Some(module) if module.starts_with('.') => continue,
                Some(module) => vec![module_root(module)],
                None => continue,
            }
        } else if let Some(rest) = stmt.strip_prefix("import ") {
            rest.split(',')
                .filter_map(|part| part.split_whitespace().next())
                .map(module_root)
                .collect()
        } else {
            continue;
        };

        for root in roots {
            let resolvable = root == package
                || STDLIB_ROOTS.contains(&root)
                || allowed_external.contains(root);
            if !resolvable {
                let detail = if root.ends_with("_pb2") || root.ends_with("_pb2_grpc") {
                    format!("sibling stub import left unrewritten: {}", stmt.trim_end())
                } else {
                    format!("import does not resolve to the package, the standard library, or a declared dependency: {root}")
                };
                violations.push(Violation::at_line(file, line_no, detail));
            }
        }
    }

    violations
}

fn module_root(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}
