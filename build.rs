use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

// Source trees checked by the lint pass. Everything else in the package is ignored.
const SOURCE_DIRS: [&str; 4] = ["risk", "cli", "tests", "benches"];

const FORBIDDEN_WORDS: &str = "FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE";

/// Which rule a collector enforces. Decides both the line filter and the report text.
#[derive(Clone, Copy)]
enum Rule {
    UnderscorePrefix,
    ForbiddenComment,
    AllCapsComment,
    AllowDeadCode,
}

impl Rule {
    fn describe(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => "underscore-prefixed variables",
            Rule::ForbiddenComment => "forbidden comment patterns",
            Rule::AllCapsComment => "comments with all uppercase alphabetic characters",
            Rule::AllowDeadCode => "#[allow(dead_code)] attributes",
        }
    }

    fn advice(self) -> String {
        match self {
            Rule::UnderscorePrefix => "Underscore-prefixed variable names are not allowed in this project.\n   Either use the variable (removing the underscore) or remove it completely.".to_string(),
            Rule::ForbiddenComment => format!(
                "Comments containing any of {} are STRICTLY FORBIDDEN in this project.\n   The '**' pattern is not allowed in regular comments (but is allowed in doc comments).",
                FORBIDDEN_WORDS.replace('|', ", ")
            ),
            Rule::AllCapsComment => "Comments where all alphabetic characters are uppercase are STRICTLY FORBIDDEN in this project.".to_string(),
            Rule::AllowDeadCode => "#[allow(dead_code)] attributes are STRICTLY FORBIDDEN in this project.\n   Either use the code (removing the attribute) or remove it completely.".to_string(),
        }
    }
}

// Collects matching lines from a single file so one report lists every offence.
struct ViolationCollector {
    rule: Rule,
    violations: Vec<String>,
    file_path: PathBuf,
}

impl ViolationCollector {
    fn new(rule: Rule, file_path: &Path) -> Self {
        Self {
            rule,
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.describe(),
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!("\n⚠️ {}\n", self.rule.advice()));
        Some(error_msg)
    }

    fn keeps(&self, line_text: &str) -> bool {
        match self.rule {
            Rule::UnderscorePrefix => !is_comment(line_text) && !underscore_only_in_strings(line_text),
            Rule::ForbiddenComment => {
                // `**` is bold markup in doc comments; forbidden words are never allowed.
                let has_word = FORBIDDEN_WORDS.split('|').any(|w| line_text.contains(w));
                has_word || !is_doc_comment(line_text)
            }
            Rule::AllCapsComment => comment_text(line_text).is_some_and(|text| {
                let alpha: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
                !alpha.is_empty() && alpha.iter().all(|c| c.is_uppercase())
            }),
            Rule::AllowDeadCode => true,
        }
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.keeps(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')
}

fn is_doc_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("///") || trimmed.starts_with("//!")
}

// Odd-numbered segments of a quote split sit inside string literals.
fn underscore_only_in_strings(line: &str) -> bool {
    line.contains('"')
        && line
            .split('"')
            .enumerate()
            .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("///").or_else(|| trimmed.strip_prefix("//!")) {
        Some(rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        Some(rest.trim())
    } else {
        line.find("/*").map(|idx| {
            let rest = &line[idx + 2..];
            rest.find("*/").map_or(rest, |end| &rest[..end]).trim()
        })
    }
}

fn rust_sources() -> impl Iterator<Item = PathBuf> {
    SOURCE_DIRS
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
}

fn scan(rule: Rule, pattern: &str) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(pattern)?;
    let mut searcher = Searcher::new();

    for path in rust_sources() {
        let mut collector = ViolationCollector::new(rule, &path);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(error_message) = collector.check_and_get_error_message() {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let build_timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=BLACKSEED_BUILD_TIMESTAMP={build_timestamp}");

    let checks = [
        (Rule::UnderscorePrefix, r"\b(_[a-zA-Z0-9_]+)\b".to_string()),
        (
            Rule::ForbiddenComment,
            format!(r"(//|/\*|///).*(?:{FORBIDDEN_WORDS})"),
        ),
        (Rule::ForbiddenComment, r"(//|/\*).*\*\*".to_string()),
        (Rule::AllCapsComment, r"(//|/\*|///).*".to_string()),
        (
            Rule::AllowDeadCode,
            r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
        ),
    ];

    for (rule, pattern) in &checks {
        // The error text is printed before exiting so it shows up in cargo's output.
        if let Err(e) = scan(*rule, pattern) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
