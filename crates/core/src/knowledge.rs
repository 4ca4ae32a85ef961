//! Knowledge loader: builds the instruction block sent as the system prompt.
//!
//! Two plain-text documents are read once at startup:
//!
//! 1. **Behavioral instructions**: `systemprompt.txt` by default
//! 2. **Knowledge base**: `Crypto_Knowledge_Base.md` by default
//!
//! They are joined under a `### KNOWLEDGE BASE ###` marker so the model can
//! tell rules from reference facts. The joined text then goes through
//! [`escape_template_braces`]: the agent renders its system prompt through a
//! brace-placeholder template, and literal braces in the documents must not
//! be read as placeholders.
//!
//! If either document cannot be read the loader logs a warning and falls
//! back to [`FALLBACK_INSTRUCTIONS`]; startup never fails here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default file name of the behavioral instructions document.
pub const INSTRUCTIONS_FILE: &str = "systemprompt.txt";
/// Default file name of the knowledge-base document.
pub const KNOWLEDGE_BASE_FILE: &str = "Crypto_Knowledge_Base.md";
/// Separator placed between the two documents.
pub const KNOWLEDGE_BASE_MARKER: &str = "### KNOWLEDGE BASE ###";
/// Used verbatim when either document is unavailable.
pub const FALLBACK_INSTRUCTIONS: &str = "You are a crypto assistant.";

/// Where the two startup documents live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeSources {
    pub instructions_path: PathBuf,
    pub knowledge_base_path: PathBuf,
}

impl Default for KnowledgeSources {
    fn default() -> Self {
        Self {
            instructions_path: PathBuf::from(INSTRUCTIONS_FILE),
            knowledge_base_path: PathBuf::from(KNOWLEDGE_BASE_FILE),
        }
    }
}

/// The immutable instruction block, built once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionBlock {
    text: String,
    fallback: bool,
}

impl InstructionBlock {
    /// Read both documents and assemble the block.
    pub fn load(sources: &KnowledgeSources) -> Self {
        let instructions = match read_document(&sources.instructions_path) {
            Some(text) => text,
            None => return Self::fallback(),
        };
        let knowledge = match read_document(&sources.knowledge_base_path) {
            Some(text) => text,
            None => return Self::fallback(),
        };

        let block = Self::from_documents(&instructions, &knowledge);
        debug!(chars = block.text.len(), "Instruction block assembled");
        block
    }

    /// Join the two documents and escape template braces.
    pub fn from_documents(instructions: &str, knowledge: &str) -> Self {
        let joined = format!("{instructions}\n\n{KNOWLEDGE_BASE_MARKER}\n{knowledge}");
        Self {
            text: escape_template_braces(&joined),
            fallback: false,
        }
    }

    /// The built-in block used when the documents are unavailable.
    pub fn fallback() -> Self {
        Self {
            text: FALLBACK_INSTRUCTIONS.to_string(),
            fallback: true,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether this is the degraded built-in block.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

impl fmt::Display for InstructionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Double every brace so a brace-placeholder renderer emits it literally.
pub fn escape_template_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

fn read_document(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Context file not found, using fallback instructions");
            None
        }
    }
}
