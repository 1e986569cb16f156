use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

/// `@tailwind base|components|utilities;` and `@import "tailwindcss";`
static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@tailwind\s+(base|components|utilities)\s*;|@import\s+["']tailwindcss["']\s*;"#)
        .unwrap()
});

const STATE_VARIANTS: &[(&str, &str)] = &[
    ("hover", ":hover"),
    ("focus", ":focus"),
    ("active", ":active"),
    ("disabled", ":disabled"),
];

const BREAKPOINTS: &[(&str, u32)] = &[("sm", 640), ("md", 768), ("lg", 1024), ("xl", 1280), ("2xl", 1536)];

static FIXED: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("block", "display: block"),
        ("inline-block", "display: inline-block"),
        ("inline", "display: inline"),
        ("flex", "display: flex"),
        ("inline-flex", "display: inline-flex"),
        ("grid", "display: grid"),
        ("hidden", "display: none"),
        ("flex-row", "flex-direction: row"),
        ("flex-col", "flex-direction: column"),
        ("flex-wrap", "flex-wrap: wrap"),
        ("flex-1", "flex: 1 1 0%"),
        ("flex-auto", "flex: 1 1 auto"),
        ("flex-none", "flex: none"),
        ("grow", "flex-grow: 1"),
        ("shrink-0", "flex-shrink: 0"),
        ("items-start", "align-items: flex-start"),
        ("items-center", "align-items: center"),
        ("items-end", "align-items: flex-end"),
        ("items-stretch", "align-items: stretch"),
        ("justify-start", "justify-content: flex-start"),
        ("justify-center", "justify-content: center"),
        ("justify-end", "justify-content: flex-end"),
        ("justify-between", "justify-content: space-between"),
        ("justify-around", "justify-content: space-around"),
        ("static", "position: static"),
        ("relative", "position: relative"),
        ("absolute", "position: absolute"),
        ("fixed", "position: fixed"),
        ("sticky", "position: sticky"),
        ("text-left", "text-align: left"),
        ("text-center", "text-align: center"),
        ("text-right", "text-align: right"),
        ("font-thin", "font-weight: 100"),
        ("font-light", "font-weight: 300"),
        ("font-normal", "font-weight: 400"),
        ("font-medium", "font-weight: 500"),
        ("font-semibold", "font-weight: 600"),
        ("font-bold", "font-weight: 700"),
        ("font-sans", "font-family: ui-sans-serif, system-ui, sans-serif"),
        ("font-mono", "font-family: ui-monospace, SFMono-Regular, Menlo, monospace"),
        ("italic", "font-style: italic"),
        ("underline", "text-decoration-line: underline"),
        ("line-through", "text-decoration-line: line-through"),
        ("no-underline", "text-decoration-line: none"),
        ("uppercase", "text-transform: uppercase"),
        ("lowercase", "text-transform: lowercase"),
        ("capitalize", "text-transform: capitalize"),
        ("truncate", "overflow: hidden; text-overflow: ellipsis; white-space: nowrap"),
        ("whitespace-nowrap", "white-space: nowrap"),
        ("overflow-hidden", "overflow: hidden"),
        ("overflow-auto", "overflow: auto"),
        ("overflow-scroll", "overflow: scroll"),
        ("w-full", "width: 100%"),
        ("w-screen", "width: 100vw"),
        ("w-auto", "width: auto"),
        ("h-full", "height: 100%"),
        ("h-screen", "height: 100vh"),
        ("h-auto", "height: auto"),
        ("min-h-screen", "min-height: 100vh"),
        ("max-w-full", "max-width: 100%"),
        ("mx-auto", "margin-left: auto; margin-right: auto"),
        ("my-auto", "margin-top: auto; margin-bottom: auto"),
        ("m-auto", "margin: auto"),
        ("border", "border-width: 1px; border-style: solid"),
        ("border-0", "border-width: 0px"),
        ("border-2", "border-width: 2px; border-style: solid"),
        ("border-4", "border-width: 4px; border-style: solid"),
        ("border-t", "border-top-width: 1px; border-top-style: solid"),
        ("border-b", "border-bottom-width: 1px; border-bottom-style: solid"),
        ("rounded-none", "border-radius: 0px"),
        ("rounded-sm", "border-radius: 0.125rem"),
        ("rounded", "border-radius: 0.25rem"),
        ("rounded-md", "border-radius: 0.375rem"),
        ("rounded-lg", "border-radius: 0.5rem"),
        ("rounded-xl", "border-radius: 0.75rem"),
        ("rounded-full", "border-radius: 9999px"),
        ("shadow-sm", "box-shadow: 0 1px 2px 0 rgb(0 0 0 / 0.05)"),
        ("shadow", "box-shadow: 0 1px 3px 0 rgb(0 0 0 / 0.1), 0 1px 2px -1px rgb(0 0 0 / 0.1)"),
        ("shadow-md", "box-shadow: 0 4px 6px -1px rgb(0 0 0 / 0.1), 0 2px 4px -2px rgb(0 0 0 / 0.1)"),
        ("shadow-lg", "box-shadow: 0 10px 15px -3px rgb(0 0 0 / 0.1), 0 4px 6px -4px rgb(0 0 0 / 0.1)"),
        ("shadow-none", "box-shadow: none"),
        ("cursor-pointer", "cursor: pointer"),
        ("cursor-not-allowed", "cursor: not-allowed"),
        ("select-none", "user-select: none"),
        ("pointer-events-none", "pointer-events: none"),
        ("z-auto", "z-index: auto"),
    ])
});

/// (suffix, font-size, line-height)
const TEXT_SIZES: &[(&str, &str, &str)] = &[
    ("xs", "0.75rem", "1rem"),
    ("sm", "0.875rem", "1.25rem"),
    ("base", "1rem", "1.5rem"),
    ("lg", "1.125rem", "1.75rem"),
    ("xl", "1.25rem", "1.75rem"),
    ("2xl", "1.5rem", "2rem"),
    ("3xl", "1.875rem", "2.25rem"),
    ("4xl", "2.25rem", "2.5rem"),
    ("5xl", "3rem", "1"),
    ("6xl", "3.75rem", "1"),
    ("7xl", "4.5rem", "1"),
    ("8xl", "6rem", "1"),
    ("9xl", "8rem", "1"),
];

/// Spacing prefixes and the properties they set; `true` allows a negative form
const SPACING: &[(&str, &[&str], bool)] = &[
    ("p", &["padding"], false),
    ("px", &["padding-left", "padding-right"], false),
    ("py", &["padding-top", "padding-bottom"], false),
    ("pt", &["padding-top"], false),
    ("pr", &["padding-right"], false),
    ("pb", &["padding-bottom"], false),
    ("pl", &["padding-left"], false),
    ("m", &["margin"], true),
    ("mx", &["margin-left", "margin-right"], true),
    ("my", &["margin-top", "margin-bottom"], true),
    ("mt", &["margin-top"], true),
    ("mr", &["margin-right"], true),
    ("mb", &["margin-bottom"], true),
    ("ml", &["margin-left"], true),
    ("gap", &["gap"], false),
    ("gap-x", &["column-gap"], false),
    ("gap-y", &["row-gap"], false),
    ("w", &["width"], false),
    ("h", &["height"], false),
    ("min-w", &["min-width"], false),
    ("min-h", &["min-height"], false),
    ("max-h", &["max-height"], false),
    ("inset", &["inset"], true),
    ("top", &["top"], true),
    ("right", &["right"], true),
    ("bottom", &["bottom"], true),
    ("left", &["left"], true),
];

const SHADES: &[&str] = &["50", "100", "200", "300", "400", "500", "600", "700", "800", "900"];

static PALETTE: Lazy<HashMap<&'static str, [&'static str; 10]>> = Lazy::new(|| {
    HashMap::from([
        ("slate", ["#f8fafc", "#f1f5f9", "#e2e8f0", "#cbd5e1", "#94a3b8", "#64748b", "#475569", "#334155", "#1e293b", "#0f172a"]),
        ("gray", ["#f9fafb", "#f3f4f6", "#e5e7eb", "#d1d5db", "#9ca3af", "#6b7280", "#4b5563", "#374151", "#1f2937", "#111827"]),
        ("red", ["#fef2f2", "#fee2e2", "#fecaca", "#fca5a5", "#f87171", "#ef4444", "#dc2626", "#b91c1c", "#991b1b", "#7f1d1d"]),
        ("yellow", ["#fefce8", "#fef9c3", "#fef08a", "#fde047", "#facc15", "#eab308", "#ca8a04", "#a16207", "#854d0e", "#713f12"]),
        ("green", ["#f0fdf4", "#dcfce7", "#bbf7d0", "#86efac", "#4ade80", "#22c55e", "#16a34a", "#15803d", "#166534", "#14532d"]),
        ("blue", ["#eff6ff", "#dbeafe", "#bfdbfe", "#93c5fd", "#60a5fa", "#3b82f6", "#2563eb", "#1d4ed8", "#1e40af", "#1e3a8a"]),
        ("indigo", ["#eef2ff", "#e0e7ff", "#c7d2fe", "#a5b4fc", "#818cf8", "#6366f1", "#4f46e5", "#4338ca", "#3730a3", "#312e81"]),
    ])
});

const NAMED_COLORS: &[(&str, &str)] = &[
    ("white", "#fff"),
    ("black", "#000"),
    ("transparent", "transparent"),
    ("current", "currentColor"),
];

/// Properties set by `text-*`, `bg-*` and `border-*` colors
const COLOR_PREFIXES: &[(&str, &str)] = &[
    ("text", "color"),
    ("bg", "background-color"),
    ("border", "border-color"),
];

/// Result of expanding the utility directives of a stylesheet
#[derive(Debug, Clone, Default)]
pub struct ExpandedStylesheet {
    pub css: String,
    /// Candidate tokens that produced a rule, sorted
    pub generated: Vec<String>,
}

/// Generates utility-class rules for the candidate tokens that match the
/// built-in table, in place of the stylesheet's utility directives.
pub struct UtilityGenerator;

impl UtilityGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn has_directives(css: &str) -> bool {
        DIRECTIVE.is_match(css)
    }

    /// Replace the directives of `css`. The first `utilities` directive (or
    /// `@import "tailwindcss"`) receives the generated rules; `base` and
    /// `components` expand to nothing.
    pub fn expand(&self, css: &str, candidates: &BTreeSet<String>) -> ExpandedStylesheet {
        if !Self::has_directives(css) {
            return ExpandedStylesheet {
                css: css.to_string(),
                generated: Vec::new(),
            };
        }

        let (rules, generated) = self.generate(candidates);
        let mut inserted = false;
        let css = DIRECTIVE
            .replace_all(css, |caps: &regex::Captures<'_>| {
                let wants_utilities = caps.get(1).map_or(true, |layer| layer.as_str() == "utilities");
                if wants_utilities && !inserted {
                    inserted = true;
                    rules.clone()
                } else {
                    String::new()
                }
            })
            .into_owned();

        ExpandedStylesheet { css, generated }
    }

    /// Rules for every matching candidate: plain rules first, then one media
    /// block per breakpoint in ascending width.
    pub fn generate(&self, candidates: &BTreeSet<String>) -> (String, Vec<String>) {
        let mut plain = String::new();
        let mut responsive: BTreeMap<u32, String> = BTreeMap::new();
        let mut generated = Vec::new();

        for candidate in candidates {
            let Some(utility) = parse_candidate(candidate) else {
                continue;
            };
            let rule = format!(
                ".{}{} {{ {}; }}\n",
                escape_class(candidate),
                utility.pseudo.unwrap_or(""),
                utility.declarations
            );
            match utility.min_width {
                Some(width) => responsive.entry(width).or_default().push_str(&rule),
                None => plain.push_str(&rule),
            }
            generated.push(candidate.clone());
        }

        for (width, rules) in responsive {
            let _ = write!(plain, "@media (min-width: {}px) {{\n{}}}\n", width, rules);
        }

        (plain, generated)
    }
}

impl Default for UtilityGenerator {
    fn default() -> Self {
        Self::new()
    }
}

struct Utility {
    declarations: String,
    pseudo: Option<&'static str>,
    min_width: Option<u32>,
}

fn parse_candidate(candidate: &str) -> Option<Utility> {
    let mut parts: Vec<&str> = candidate.split(':').collect();
    let base = parts.pop()?;
    let declarations = declarations_for(base)?;

    let mut pseudo = None;
    let mut min_width = None;
    for variant in parts {
        if let Some((_, selector)) = STATE_VARIANTS.iter().find(|(name, _)| *name == variant) {
            if pseudo.replace(*selector).is_some() {
                return None;
            }
        } else if let Some((_, width)) = BREAKPOINTS.iter().find(|(name, _)| *name == variant) {
            if min_width.replace(*width).is_some() {
                return None;
            }
        } else {
            return None;
        }
    }

    Some(Utility {
        declarations,
        pseudo,
        min_width,
    })
}

/// Declarations for a variant-free utility name, or `None` if the table has no match
fn declarations_for(base: &str) -> Option<String> {
    if let Some(fixed) = FIXED.get(base) {
        return Some(fixed.to_string());
    }

    if let Some(size) = base.strip_prefix("text-") {
        if let Some((_, font_size, line_height)) = TEXT_SIZES.iter().find(|(name, _, _)| *name == size) {
            return Some(format!("font-size: {}; line-height: {}", font_size, line_height));
        }
    }

    if let Some(declarations) = color_utility(base) {
        return Some(declarations);
    }

    if let Some(value) = base.strip_prefix("opacity-") {
        let percent: u32 = value.parse().ok()?;
        if percent > 100 || percent % 5 != 0 {
            return None;
        }
        return Some(format!("opacity: {}", percent as f64 / 100.0));
    }

    if let Some(value) = base.strip_prefix("z-") {
        let level: u32 = value.parse().ok()?;
        return (level <= 50 && level % 10 == 0).then(|| format!("z-index: {}", level));
    }

    if let Some(value) = base.strip_prefix("grid-cols-") {
        let columns: u32 = value.parse().ok()?;
        return (1..=12)
            .contains(&columns)
            .then(|| format!("grid-template-columns: repeat({}, minmax(0, 1fr))", columns));
    }

    spacing_utility(base)
}

fn color_utility(base: &str) -> Option<String> {
    let (prefix, color) = base.split_once('-')?;
    let (_, property) = COLOR_PREFIXES.iter().find(|(name, _)| *name == prefix)?;

    if let Some((_, value)) = NAMED_COLORS.iter().find(|(name, _)| *name == color) {
        return Some(format!("{}: {}", property, value));
    }

    let (hue, shade) = color.rsplit_once('-')?;
    let shades = PALETTE.get(hue)?;
    let index = SHADES.iter().position(|s| *s == shade)?;
    Some(format!("{}: {}", property, shades[index]))
}

fn spacing_utility(base: &str) -> Option<String> {
    let (negative, name) = match base.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, base),
    };

    // Longest prefix first so `gap-x-2` is not read as `gap` with value `x-2`
    let (properties, allows_negative, value) = SPACING
        .iter()
        .filter_map(|(prefix, properties, allows_negative)| {
            let value = name.strip_prefix(prefix)?.strip_prefix('-')?;
            Some((prefix.len(), *properties, *allows_negative, value))
        })
        .max_by_key(|(len, ..)| *len)
        .map(|(_, properties, allows_negative, value)| (properties, allows_negative, value))?;

    if negative && !allows_negative {
        return None;
    }

    let mut length = spacing_value(value)?;
    if negative {
        if length == "0px" {
            return None;
        }
        length = format!("-{}", length);
    }

    Some(
        properties
            .iter()
            .map(|property| format!("{}: {}", property, length))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// `4` → `1rem`, `0.5` → `0.125rem`, `px` → `1px`, `1/2` → `50%`
fn spacing_value(value: &str) -> Option<String> {
    match value {
        "0" => return Some("0px".to_string()),
        "px" => return Some("1px".to_string()),
        _ => {}
    }

    if let Some((numerator, denominator)) = value.split_once('/') {
        let numerator: u32 = numerator.parse().ok()?;
        let denominator: u32 = denominator.parse().ok()?;
        if denominator == 0 || numerator >= denominator || denominator > 12 {
            return None;
        }
        let percent = numerator as f64 * 100.0 / denominator as f64;
        return Some(format!("{}%", trim_number(percent)));
    }

    if !value.bytes().all(|b| b.is_ascii_digit() || b == b'.') || value.starts_with('.') {
        return None;
    }
    let steps: f64 = value.parse().ok()?;
    if steps > 96.0 || (steps * 2.0).fract() != 0.0 {
        return None;
    }
    if steps == 0.0 {
        return Some("0px".to_string());
    }
    Some(format!("{}rem", trim_number(steps * 0.25)))
}

fn trim_number(value: f64) -> String {
    let text = format!("{:.6}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Escape a class token for use in a selector
pub fn escape_class(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if i == 0 && c.is_ascii_digit() {
            let _ = write!(out, "\\{:x} ", c as u32);
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}
