//! Declaration extraction.
//!
//! Pulls line-leading `attribute`, `varying`, `out` and `uniform` statements
//! out of a stage text. The first removed statement is replaced with
//! [`MARKER`]; later ones leave nothing behind, so all generated declarations
//! end up at a single point of the residual text.

use crate::error::DeclarationError;
use crate::shader::declarations::{
    AttributeDeclaration, OutputDeclaration, UniformDeclaration, VaryingDeclaration,
};

/// Insertion point left in the residual text.
pub const MARKER: &str = "@@@";

/// Declarations of one stage, in source order, and the text left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedStage {
    pub residual: String,
    pub attributes: Vec<AttributeDeclaration>,
    pub varyings: Vec<VaryingDeclaration>,
    pub outputs: Vec<OutputDeclaration>,
    pub uniforms: Vec<UniformDeclaration>,
}

impl ExtractedStage {
    pub fn has_marker(&self) -> bool {
        self.residual.contains(MARKER)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Attribute,
    Varying,
    Out,
    Uniform,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "attribute" => Some(Self::Attribute),
            "varying" => Some(Self::Varying),
            "out" => Some(Self::Out),
            "uniform" => Some(Self::Uniform),
            _ => None,
        }
    }
}

/// Extract declarations from a stage text.
///
/// Only statements that start a line (after optional whitespace) are
/// declarations. `out` inside a parameter list or a function body is left
/// alone, as are comments, preprocessor lines and uniform blocks.
pub fn extract(source: &str) -> Result<ExtractedStage, DeclarationError> {
    let bytes = source.as_bytes();
    let len = bytes.len();

    let mut stage = ExtractedStage::default();
    let mut residual = String::with_capacity(len + MARKER.len() + 1);
    let mut marker_placed = false;
    let mut copied_to = 0;

    let mut i = 0;
    let mut line_start = true;
    let mut indent_start = 0;
    let mut brace_depth = 0usize;
    let mut paren_depth = 0usize;

    while i < len {
        let c = bytes[i];
        match c {
            b'\n' => {
                line_start = true;
                indent_start = i + 1;
                i += 1;
            }
            b' ' | b'\t' | b'\r' => i += 1,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = find_byte(bytes, i, b'\n').unwrap_or(len);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = source[i + 2..]
                    .find("*/")
                    .map(|end| i + 2 + end + 2)
                    .unwrap_or(len);
                line_start = false;
            }
            b'#' if line_start => {
                i = find_byte(bytes, i, b'\n').unwrap_or(len);
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let word_end = (i..len)
                    .find(|&j| !(bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_'))
                    .unwrap_or(len);
                let keyword = Keyword::from_word(&source[i..word_end]);
                let followed_by_space = bytes
                    .get(word_end)
                    .is_some_and(|b| b.is_ascii_whitespace());

                let candidate = match keyword {
                    Some(Keyword::Out) => brace_depth == 0,
                    Some(_) => true,
                    None => false,
                };

                if !(candidate && line_start && paren_depth == 0 && followed_by_space) {
                    line_start = false;
                    i = word_end;
                    continue;
                }

                let Some(semicolon) = find_byte(bytes, word_end, b';') else {
                    return Err(DeclarationError::Malformed {
                        line: source[i..].trim().to_string(),
                    });
                };
                let text = &source[word_end..semicolon];

                // `uniform Name { ... };` is a block, not a loose declaration
                if text.contains('{') {
                    line_start = false;
                    i = word_end;
                    continue;
                }

                match keyword {
                    Some(Keyword::Attribute) => {
                        stage.attributes.push(AttributeDeclaration::parse(text)?)
                    }
                    Some(Keyword::Varying) => stage.varyings.push(VaryingDeclaration::parse(text)?),
                    Some(Keyword::Out) => stage.outputs.push(OutputDeclaration::parse(text)?),
                    Some(Keyword::Uniform) => stage.uniforms.push(UniformDeclaration::parse(text)?),
                    None => {}
                }

                residual.push_str(&source[copied_to..indent_start]);
                if !marker_placed {
                    residual.push_str(MARKER);
                    residual.push('\n');
                    marker_placed = true;
                }

                let mut end = semicolon;
                while end < len && bytes[end] == b';' {
                    end += 1;
                }
                while end < len && matches!(bytes[end], b' ' | b'\t' | b'\r') {
                    end += 1;
                }
                if end < len && bytes[end] == b'\n' {
                    end += 1;
                }

                copied_to = end;
                indent_start = end;
                line_start = true;
                i = end;
            }
            b'{' => {
                brace_depth += 1;
                line_start = false;
                i += 1;
            }
            b'}' => {
                brace_depth = brace_depth.saturating_sub(1);
                line_start = false;
                i += 1;
            }
            b'(' => {
                paren_depth += 1;
                line_start = false;
                i += 1;
            }
            b')' => {
                paren_depth = paren_depth.saturating_sub(1);
                line_start = false;
                i += 1;
            }
            _ => {
                line_start = false;
                i += 1;
            }
        }
    }

    residual.push_str(&source[copied_to..]);
    stage.residual = residual;

    log::trace!(
        "extracted {} attributes, {} varyings, {} outputs, {} uniforms",
        stage.attributes.len(),
        stage.varyings.len(),
        stage.outputs.len(),
        stage.uniforms.len()
    );

    Ok(stage)
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes[from..].iter().position(|&b| b == needle).map(|p| from + p)
}
