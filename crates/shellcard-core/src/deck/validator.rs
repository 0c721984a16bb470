//! Author-time static validation of deck directories.
//!
//! A pure function from a deck directory to diagnostics. Phases: structure,
//! deck.yaml, cards.csv, deck/card consistency, prerequisite graph, security,
//! usability. Errors prevent installation; warnings do not.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::deck::manifest::{DeckManifest, CARDS_CSV_HEADER};
use crate::error::ShellcardResult;

// Structure errors.
pub const STRUCT001: &str = "STRUCT001"; // missing required file
pub const STRUCT002: &str = "STRUCT002"; // invalid file format
pub const STRUCT003: &str = "STRUCT003"; // file read error

// Deck errors.
pub const DECK001: &str = "DECK001"; // missing required field
pub const DECK002: &str = "DECK002"; // invalid version format
pub const DECK005: &str = "DECK005"; // difficulty range mismatch

// Card errors.
pub const CARD001: &str = "CARD001"; // duplicate card key
pub const CARD002: &str = "CARD002"; // missing required field
pub const CARD003: &str = "CARD003"; // invalid prerequisite reference
pub const CARD004: &str = "CARD004"; // circular dependency
pub const CARD005: &str = "CARD005"; // invalid key format
pub const CARD006: &str = "CARD006"; // setup without cleanup

// Security warnings.
pub const SEC001: &str = "SEC001"; // network enabled globally
pub const SEC003: &str = "SEC003"; // dangerous command pattern

// Performance warnings.
pub const PERF001: &str = "PERF001"; // timeout too short
pub const PERF002: &str = "PERF002"; // timeout too long

// Usability warnings.
pub const UX001: &str = "UX001"; // missing explanation
pub const UX002: &str = "UX002"; // missing hint
pub const UX003: &str = "UX003"; // difficulty progression issue
pub const UX004: &str = "UX004"; // prerequisite chain too long

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

/// One validation finding.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// File the finding refers to, when applicable.
    pub file: String,
    /// 1-based line; 0 when not applicable.
    pub line: usize,
    /// 1-based column; 0 when not applicable.
    pub column: usize,
    pub code: &'static str,
    pub message: String,
    pub details: String,
}

/// The outcome of validating one deck directory.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub info: Vec<Diagnostic>,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            info: Vec::new(),
        }
    }

    fn error(&mut self, file: &str, line: usize, column: usize, code: &'static str, message: impl Into<String>, details: impl Into<String>) {
        self.errors.push(Diagnostic {
            level: DiagnosticLevel::Error,
            file: file.to_string(),
            line,
            column,
            code,
            message: message.into(),
            details: details.into(),
        });
    }

    fn warning(&mut self, file: &str, line: usize, code: &'static str, message: impl Into<String>, details: impl Into<String>) {
        self.warnings.push(Diagnostic {
            level: DiagnosticLevel::Warning,
            file: file.to_string(),
            line,
            column: 0,
            code,
            message: message.into(),
            details: details.into(),
        });
    }

    fn note(&mut self, code: &'static str, message: impl Into<String>) {
        self.info.push(Diagnostic {
            level: DiagnosticLevel::Info,
            file: String::new(),
            line: 0,
            column: 0,
            code,
            message: message.into(),
            details: String::new(),
        });
    }

    /// Render the result for terminal output.
    pub fn render_human(&self, verbose: bool) -> String {
        let mut out = String::new();
        if self.valid {
            out.push_str("Deck validation passed.\n");
        } else {
            out.push_str("Deck validation failed.\n");
        }

        if !self.errors.is_empty() {
            let _ = writeln!(out, "\nErrors ({}):", self.errors.len());
            for diag in &self.errors {
                let _ = writeln!(out, "  {}", diag.render(verbose));
            }
        }
        if !self.warnings.is_empty() {
            let _ = writeln!(out, "\nWarnings ({}):", self.warnings.len());
            for diag in &self.warnings {
                let _ = writeln!(out, "  {}", diag.render(verbose));
            }
        }
        if verbose && !self.info.is_empty() {
            let _ = writeln!(out, "\nInfo ({}):", self.info.len());
            for diag in &self.info {
                let _ = writeln!(out, "  {}: {}", diag.code, diag.message);
            }
        }

        let _ = writeln!(
            out,
            "\nSummary: {} errors, {} warnings",
            self.errors.len(),
            self.warnings.len()
        );
        out
    }
}

impl Diagnostic {
    fn render(&self, verbose: bool) -> String {
        let mut location = self.file.clone();
        if self.line > 0 {
            let _ = write!(location, ":{}", self.line);
            if self.column > 0 {
                let _ = write!(location, ":{}", self.column);
            }
        }
        let mut text = format!("{} [{}] {}", location, self.code, self.message);
        if verbose && !self.details.is_empty() {
            let _ = write!(text, "\n    {}", self.details);
        }
        text
    }
}

/// Parsed card fields the validator works over.
#[derive(Debug, Clone, Default)]
struct CardSpec {
    key: String,
    title: String,
    command: String,
    description: String,
    setup: String,
    cleanup: String,
    prerequisites: String,
    hint: String,
    explanation: String,
    difficulty: i64,
}

/// Validate a deck directory.
pub fn validate_deck(deck_path: &Path) -> ShellcardResult<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_structure(deck_path, &mut result);
    if !result.errors.is_empty() {
        result.valid = false;
        return Ok(result);
    }

    let manifest = parse_deck_yaml(deck_path, &mut result);
    let cards = parse_cards_csv(deck_path, &mut result);

    if let (Some(manifest), false) = (&manifest, cards.is_empty()) {
        validate_deck_card_consistency(manifest, &cards, &mut result);
    }
    validate_dependency_graph(&cards, &mut result);
    validate_security(&cards, &mut result);
    validate_usability(&cards, &mut result);

    result.valid = result.errors.is_empty();
    Ok(result)
}

fn validate_structure(deck_path: &Path, result: &mut ValidationResult) {
    if !deck_path.exists() {
        result.error(
            &deck_path.display().to_string(),
            0,
            0,
            STRUCT001,
            "deck directory does not exist",
            format!("path: {}", deck_path.display()),
        );
        return;
    }

    for required in ["deck.yaml", "cards.csv"] {
        if !deck_path.join(required).is_file() {
            result.error(
                required,
                0,
                0,
                STRUCT001,
                format!("required file '{required}' is missing"),
                "every deck must have deck.yaml and cards.csv",
            );
        }
    }

    for optional in ["README.md", "assets"] {
        if deck_path.join(optional).exists() {
            result.note("INFO001", format!("found optional entry: {optional}"));
        }
    }
}

fn parse_deck_yaml(deck_path: &Path, result: &mut ValidationResult) -> Option<DeckManifest> {
    let content = match std::fs::read_to_string(deck_path.join("deck.yaml")) {
        Ok(content) => content,
        Err(e) => {
            result.error("deck.yaml", 0, 0, STRUCT003, "failed to read deck.yaml", e.to_string());
            return None;
        }
    };

    let manifest: DeckManifest = match serde_yaml::from_str(&content) {
        Ok(manifest) => manifest,
        Err(e) => {
            result.error("deck.yaml", 0, 0, STRUCT002, "invalid YAML in deck.yaml", e.to_string());
            return None;
        }
    };

    for (field, value) in [
        ("name", &manifest.name),
        ("version", &manifest.version),
        ("author", &manifest.author),
        ("description", &manifest.description),
    ] {
        if value.trim().is_empty() {
            result.error(
                "deck.yaml",
                0,
                0,
                DECK001,
                format!("required field '{field}' is missing or empty"),
                "all decks must have name, version, author, and description",
            );
        }
    }

    let semver = Regex::new(r"^\d+\.\d+\.\d+$").expect("static pattern");
    if !semver.is_match(&manifest.version) {
        result.warning(
            "deck.yaml",
            0,
            DECK002,
            "version should follow semantic versioning (x.y.z)",
            format!("current version: {}", manifest.version),
        );
    }

    validate_container_spec(&manifest, result);
    Some(manifest)
}

fn validate_container_spec(manifest: &DeckManifest, result: &mut ValidationResult) {
    let timeout = manifest.container.timeout;
    if timeout > 0 && timeout < 5 {
        result.warning(
            "deck.yaml",
            0,
            PERF001,
            "container timeout is very short (<5s)",
            "short timeouts may cause legitimate commands to fail",
        );
    }
    if timeout > 300 {
        result.warning(
            "deck.yaml",
            0,
            PERF002,
            "container timeout is very long (>300s)",
            "long timeouts may indicate inefficient commands",
        );
    }

    if manifest.container.network {
        result.warning(
            "deck.yaml",
            0,
            SEC001,
            "network access is enabled globally",
            "consider enabling network only for specific cards that need it",
        );
    }
}

fn parse_cards_csv(deck_path: &Path, result: &mut ValidationResult) -> Vec<CardSpec> {
    let mut reader = match csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(deck_path.join("cards.csv"))
    {
        Ok(reader) => reader,
        Err(e) => {
            result.error("cards.csv", 0, 0, STRUCT003, "failed to read cards.csv", e.to_string());
            return Vec::new();
        }
    };

    let records: Vec<csv::StringRecord> = match reader.records().collect() {
        Ok(records) => records,
        Err(e) => {
            result.error("cards.csv", 0, 0, STRUCT002, "invalid CSV in cards.csv", e.to_string());
            return Vec::new();
        }
    };

    if records.len() < 2 {
        result.error(
            "cards.csv",
            0,
            0,
            CARD002,
            "cards.csv must have a header row and at least one card",
            "empty decks are not allowed",
        );
        return Vec::new();
    }

    let header = &records[0];
    for (index, expected) in CARDS_CSV_HEADER.iter().enumerate() {
        let actual = header.get(index).unwrap_or("<missing>");
        if actual != *expected {
            result.error(
                "cards.csv",
                1,
                index + 1,
                STRUCT002,
                format!("CSV header mismatch at column {}: expected '{expected}', got '{actual}'", index + 1),
                "the CSV header must match the 13-column schema exactly",
            );
        }
    }
    if !result.errors.is_empty() {
        return Vec::new();
    }

    let mut cards = Vec::new();
    let mut seen_keys: HashMap<String, usize> = HashMap::new();

    for (offset, record) in records[1..].iter().enumerate() {
        let line = offset + 2;

        if record.len() != CARDS_CSV_HEADER.len() {
            result.error(
                "cards.csv",
                line,
                0,
                STRUCT002,
                format!(
                    "card at line {line} has {} fields, expected {}",
                    record.len(),
                    CARDS_CSV_HEADER.len()
                ),
                "every card must have all columns (values may be empty)",
            );
            continue;
        }

        let field = |index: usize| record.get(index).unwrap_or("").trim().to_string();
        let difficulty = match field(11).parse::<i64>() {
            Ok(value) => value,
            Err(_) => {
                result.error(
                    "cards.csv",
                    line,
                    12,
                    CARD002,
                    "difficulty must be a number",
                    format!("got: '{}'", field(11)),
                );
                continue;
            }
        };

        let card = CardSpec {
            key: field(0),
            title: field(1),
            command: field(2),
            description: field(3),
            setup: field(4),
            cleanup: field(5),
            prerequisites: field(6),
            hint: field(8),
            explanation: field(10),
            difficulty,
        };

        validate_card_fields(&card, line, result);

        if let Some(previous) = seen_keys.get(&card.key) {
            result.error(
                "cards.csv",
                line,
                0,
                CARD001,
                format!("duplicate card key '{}' (also used at line {previous})", card.key),
                "card keys must be unique within a deck",
            );
        } else {
            seen_keys.insert(card.key.clone(), line);
        }

        cards.push(card);
    }

    cards
}

fn validate_card_fields(card: &CardSpec, line: usize, result: &mut ValidationResult) {
    for (field, value) in [
        ("key", &card.key),
        ("title", &card.title),
        ("command", &card.command),
        ("description", &card.description),
    ] {
        if value.is_empty() {
            result.error(
                "cards.csv",
                line,
                0,
                CARD002,
                format!("required field '{field}' is empty"),
                "key, title, command, and description are required for all cards",
            );
        }
    }

    let key_pattern = Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static pattern");
    if !card.key.is_empty() && !key_pattern.is_match(&card.key) {
        result.error(
            "cards.csv",
            line,
            0,
            CARD005,
            "card key contains invalid characters",
            "keys may contain only letters, numbers, hyphens, and underscores",
        );
    }

    if !(1..=6).contains(&card.difficulty) {
        result.warning(
            "cards.csv",
            line,
            UX003,
            format!("difficulty {} is outside the supported range (1-6)", card.difficulty),
            "1=trivial, 2=easy, 3=medium, 4=hard, 5=expert, 6=insane",
        );
    }

    if !card.setup.is_empty() && card.cleanup.is_empty() {
        result.warning(
            "cards.csv",
            line,
            CARD006,
            "card has a setup command but no cleanup command",
            "setup commands should have corresponding cleanup for repeatability",
        );
    }

    if card.hint.is_empty() {
        result.warning(
            "cards.csv",
            line,
            UX002,
            "card has no hint",
            "hints help learners without giving away the answer",
        );
    }
    if card.explanation.is_empty() {
        result.warning(
            "cards.csv",
            line,
            UX001,
            "card has no explanation",
            "explanations help learners understand command output",
        );
    }
}

fn validate_deck_card_consistency(
    manifest: &DeckManifest,
    cards: &[CardSpec],
    result: &mut ValidationResult,
) {
    if manifest.difficulty_range.len() == 2 {
        let (min, max) = (manifest.difficulty_range[0], manifest.difficulty_range[1]);
        for card in cards {
            if card.difficulty < min || card.difficulty > max {
                result.warning(
                    "deck.yaml",
                    0,
                    DECK005,
                    format!(
                        "card '{}' difficulty ({}) outside declared range [{min}, {max}]",
                        card.key, card.difficulty
                    ),
                    "update difficulty_range in deck.yaml or adjust card difficulties",
                );
            }
        }
    }
}

fn validate_dependency_graph(cards: &[CardSpec], result: &mut ValidationResult) {
    let known: HashMap<&str, ()> = cards.iter().map(|card| (card.key.as_str(), ())).collect();

    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for card in cards {
        for prereq in split_prereqs(&card.prerequisites) {
            if !known.contains_key(prereq) {
                result.error(
                    "cards.csv",
                    0,
                    0,
                    CARD003,
                    format!("card '{}' references non-existent prerequisite '{prereq}'", card.key),
                    "all prerequisites must reference existing card keys",
                );
                continue;
            }
            graph.entry(card.key.as_str()).or_default().push(prereq);
        }
    }

    // DFS cycle detection over the prerequisite DAG.
    let mut visited: HashMap<&str, bool> = HashMap::new();
    let mut on_stack: HashMap<&str, bool> = HashMap::new();
    for card in cards {
        let key = card.key.as_str();
        if !visited.get(key).copied().unwrap_or(false)
            && has_cycle(key, &graph, &mut visited, &mut on_stack)
        {
            result.error(
                "cards.csv",
                0,
                0,
                CARD004,
                format!("circular dependency detected involving card '{key}'"),
                "prerequisites must form a directed acyclic graph",
            );
        }
    }
}

fn has_cycle<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashMap<&'a str, bool>,
    on_stack: &mut HashMap<&'a str, bool>,
) -> bool {
    visited.insert(node, true);
    on_stack.insert(node, true);

    if let Some(neighbors) = graph.get(node) {
        for &neighbor in neighbors {
            if !visited.get(neighbor).copied().unwrap_or(false) {
                if has_cycle(neighbor, graph, visited, on_stack) {
                    return true;
                }
            } else if on_stack.get(neighbor).copied().unwrap_or(false) {
                return true;
            }
        }
    }

    on_stack.insert(node, false);
    false
}

fn validate_security(cards: &[CardSpec], result: &mut ValidationResult) {
    let patterns = [
        r"rm\s+-rf\s+/",
        r"sudo",
        r"su\s",
        r"chmod\s+777",
        r"wget\s+http://",
        r"curl.*http://",
    ];
    let compiled: Vec<Regex> = patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("static pattern"))
        .collect();

    for card in cards {
        for command in [&card.command, &card.setup, &card.cleanup] {
            if command.is_empty() {
                continue;
            }
            for (pattern, regex) in patterns.iter().zip(&compiled) {
                if regex.is_match(command) {
                    result.warning(
                        "cards.csv",
                        0,
                        SEC003,
                        format!("card '{}' contains a potentially dangerous command", card.key),
                        format!("pattern matched: {pattern}"),
                    );
                }
            }
        }
    }
}

fn validate_usability(cards: &[CardSpec], result: &mut ValidationResult) {
    // Large difficulty jumps between consecutive cards.
    for window in cards.windows(2) {
        let jump = window[1].difficulty - window[0].difficulty;
        if jump > 2 {
            result.warning(
                "cards.csv",
                0,
                UX003,
                format!(
                    "large difficulty jump from '{}' ({}) to '{}' ({})",
                    window[0].key, window[0].difficulty, window[1].key, window[1].difficulty
                ),
                "consider adding intermediate cards for a smoother progression",
            );
        }
    }

    for card in cards {
        let mut visiting = HashMap::new();
        let depth = prerequisite_chain_length(&card.key, cards, &mut visiting);
        if depth > 5 {
            result.warning(
                "cards.csv",
                0,
                UX004,
                format!("card '{}' has a very long prerequisite chain ({depth} levels)", card.key),
                "long chains frustrate learners; consider restructuring prerequisites",
            );
        }
    }
}

fn prerequisite_chain_length(
    key: &str,
    cards: &[CardSpec],
    visiting: &mut HashMap<String, bool>,
) -> usize {
    if visiting.get(key).copied().unwrap_or(false) {
        return 0; // circular reference protection
    }
    visiting.insert(key.to_string(), true);

    let card = cards.iter().find(|card| card.key == key);
    let depth = match card {
        None => 0,
        Some(card) if card.prerequisites.is_empty() => 0,
        Some(card) => {
            split_prereqs(&card.prerequisites)
                .map(|prereq| prerequisite_chain_length(prereq, cards, visiting))
                .max()
                .unwrap_or(0)
                + 1
        }
    };

    visiting.insert(key.to_string(), false);
    depth
}

fn split_prereqs(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}
