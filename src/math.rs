use anyhow::Result;
use std::sync::Arc;

/// One slice of a message after delimiter scanning. Math spans carry the
/// expression without its dollar delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MathSegment<'a> {
    Plain(&'a str),
    Inline(&'a str),
    Block(&'a str),
}

/// Splits `text` into plain and math segments in one left-to-right scan.
/// Block delimiters (`$$...$$`) are matched before inline (`$...$`) so a
/// block span is never misread as two inline spans. An unterminated span is
/// treated as plain text.
pub fn split_math_segments(text: &str) -> Vec<MathSegment<'_>> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    while cursor < text.len() {
        let rest = &text[cursor..];
        let Some(dollar) = rest.find('$') else {
            segments.push(MathSegment::Plain(rest));
            break;
        };

        if dollar > 0 {
            segments.push(MathSegment::Plain(&rest[..dollar]));
        }

        let span_start = cursor + dollar;
        let after_dollar = &text[span_start..];

        if let Some(block_body) = after_dollar.strip_prefix("$$") {
            if let Some(close) = block_body.find("$$") {
                segments.push(MathSegment::Block(&block_body[..close]));
                cursor = span_start + 2 + close + 2;
                continue;
            }
        } else if let Some(inline_body) = after_dollar.strip_prefix('$') {
            if let Some(close) = inline_body.find('$') {
                segments.push(MathSegment::Inline(&inline_body[..close]));
                cursor = span_start + 1 + close + 1;
                continue;
            }
        }

        // No closing delimiter: the rest is plain text.
        segments.push(MathSegment::Plain(after_dollar));
        break;
    }

    segments
}

/// The external typesetting engine boundary. `display_mode` distinguishes
/// block from inline spans.
pub trait MathEngine: Send + Sync {
    fn render(&self, expression: &str, display_mode: bool) -> Result<String>;
}

/// Fail-soft wrapper around an optionally-available engine. Rendering a
/// message must never take the conversation view down: with no engine, or on
/// any engine error, the input text comes back unchanged.
#[derive(Clone, Default)]
pub struct MathRenderer {
    engine: Option<Arc<dyn MathEngine>>,
}

impl MathRenderer {
    pub fn new(engine: Arc<dyn MathEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    pub fn unavailable() -> Self {
        Self { engine: None }
    }

    pub fn typeset(&self, text: &str) -> String {
        let Some(engine) = &self.engine else {
            return text.to_string();
        };

        match self.try_typeset(text, engine.as_ref()) {
            Ok(rendered) => rendered,
            Err(_) => text.to_string(),
        }
    }

    fn try_typeset(&self, text: &str, engine: &dyn MathEngine) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        for segment in split_math_segments(text) {
            match segment {
                MathSegment::Plain(plain) => out.push_str(plain),
                MathSegment::Inline(expression) => {
                    out.push_str(&engine.render(expression, false)?)
                }
                MathSegment::Block(expression) => out.push_str(&engine.render(expression, true)?),
            }
        }
        Ok(out)
    }
}

/// Terminal typesetting: rewrites common LaTeX constructs into unicode so
/// formulas read naturally in a text cell. Unknown commands are left as-is
/// rather than erroring.
pub struct GlyphMathEngine;

const COMMAND_GLYPHS: &[(&str, &str)] = &[
    ("\\alpha", "α"),
    ("\\beta", "β"),
    ("\\gamma", "γ"),
    ("\\delta", "δ"),
    ("\\epsilon", "ε"),
    ("\\theta", "θ"),
    ("\\lambda", "λ"),
    ("\\mu", "μ"),
    ("\\pi", "π"),
    ("\\rho", "ρ"),
    ("\\sigma", "σ"),
    ("\\tau", "τ"),
    ("\\phi", "φ"),
    ("\\omega", "ω"),
    ("\\Delta", "Δ"),
    ("\\Omega", "Ω"),
    ("\\cdot", "·"),
    ("\\times", "×"),
    ("\\pm", "±"),
    ("\\approx", "≈"),
    ("\\leq", "≤"),
    ("\\geq", "≥"),
    ("\\neq", "≠"),
    ("\\to", "→"),
    ("\\rightarrow", "→"),
    ("\\infty", "∞"),
    ("\\sqrt", "√"),
    ("\\sum", "Σ"),
    ("\\int", "∫"),
];

const SUPERSCRIPTS: &[(char, char)] = &[
    ('0', '⁰'),
    ('1', '¹'),
    ('2', '²'),
    ('3', '³'),
    ('4', '⁴'),
    ('5', '⁵'),
    ('6', '⁶'),
    ('7', '⁷'),
    ('8', '⁸'),
    ('9', '⁹'),
    ('n', 'ⁿ'),
    ('-', '⁻'),
];

const SUBSCRIPTS: &[(char, char)] = &[
    ('0', '₀'),
    ('1', '₁'),
    ('2', '₂'),
    ('3', '₃'),
    ('4', '₄'),
    ('5', '₅'),
    ('6', '₆'),
    ('7', '₇'),
    ('8', '₈'),
    ('9', '₉'),
];

impl MathEngine for GlyphMathEngine {
    fn render(&self, expression: &str, display_mode: bool) -> Result<String> {
        let mut rendered = rewrite_fractions(expression);
        for (command, glyph) in COMMAND_GLYPHS {
            rendered = rendered.replace(command, glyph);
        }
        rendered = rewrite_scripts(&rendered, '^', SUPERSCRIPTS);
        rendered = rewrite_scripts(&rendered, '_', SUBSCRIPTS);
        rendered = rendered.replace(['{', '}'], "");

        if display_mode {
            Ok(format!("\n    {}\n", rendered.trim()))
        } else {
            Ok(rendered)
        }
    }
}

// \frac{a}{b} -> (a)/(b); single-symbol arguments skip the parentheses.
fn rewrite_fractions(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut rest = expression;

    while let Some(position) = rest.find("\\frac") {
        out.push_str(&rest[..position]);
        let after = &rest[position + "\\frac".len()..];
        match split_brace_pair(after) {
            Some((numerator, denominator, consumed)) => {
                out.push_str(&fraction_side(numerator));
                out.push('/');
                out.push_str(&fraction_side(denominator));
                rest = &after[consumed..];
            }
            None => {
                out.push_str("\\frac");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn fraction_side(argument: &str) -> String {
    if argument.chars().count() <= 1 {
        argument.to_string()
    } else {
        format!("({argument})")
    }
}

// Parses "{a}{b}" at the start of the input, returning both bodies and the
// byte count consumed.
fn split_brace_pair(input: &str) -> Option<(&str, &str, usize)> {
    let first = parse_braced(input)?;
    let second = parse_braced(&input[first.1..])?;
    Some((first.0, second.0, first.1 + second.1))
}

fn parse_braced(input: &str) -> Option<(&str, usize)> {
    let body_start = input.strip_prefix('{')?;
    let mut depth = 1usize;
    for (index, ch) in body_start.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&body_start[..index], index + 2));
                }
            }
            _ => {}
        }
    }
    None
}

// ^2 / _0 and their braced forms become unicode scripts when every
// character has a glyph; otherwise the marker is kept verbatim.
fn rewrite_scripts(expression: &str, marker: char, table: &[(char, char)]) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut chars = expression.char_indices().peekable();

    while let Some((index, ch)) = chars.next() {
        if ch != marker {
            out.push(ch);
            continue;
        }

        let rest = &expression[index + ch.len_utf8()..];
        let (body, consumed) = match parse_braced(rest) {
            Some((body, consumed)) => (body.to_string(), consumed),
            None => match rest.chars().next() {
                Some(single) => (single.to_string(), single.len_utf8()),
                None => {
                    out.push(ch);
                    continue;
                }
            },
        };

        let converted: Option<String> = body
            .chars()
            .map(|c| table.iter().find(|(from, _)| *from == c).map(|(_, to)| *to))
            .collect();

        match converted {
            Some(scripted) => {
                out.push_str(&scripted);
                for _ in 0..consumed {
                    chars.next();
                }
            }
            None => out.push(ch),
        }
    }

    out
}
