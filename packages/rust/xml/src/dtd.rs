//! Internal DTD subset: general entity declarations.

use std::collections::HashMap;
use std::sync::LazyLock;

use quick_xml::escape::{resolve_predefined_entity, unescape_with};
use regex::Regex;

use xmlscrub_shared::{Result, ScrubError};

/// Matches `<!ENTITY name "value">` or `<!ENTITY name 'value'>`.
/// Parameter entities (`<!ENTITY % ...>`) and external ones never match.
static ENTITY_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!ENTITY\s+([^\s%"'>]+)\s+(?:"([^"]*)"|'([^']*)')\s*>"#)
        .expect("entity declaration regex")
});

/// Named references inside an entity value.
static ENTITY_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&([^#;&\s]+);").expect("entity reference regex"));

/// Collect internal general entities from a DOCTYPE body.
///
/// Values are fully expanded: character references, predefined entities,
/// and references to other entities of the same subset. The first
/// declaration of a name wins. An undeclared or self-referencing entity is
/// a parse error at `position`.
pub(crate) fn internal_entities(doctype: &str, position: u64) -> Result<HashMap<String, String>> {
    let Some(open) = doctype.find('[') else {
        return Ok(HashMap::new());
    };
    let subset = match doctype.rfind(']') {
        Some(close) if close > open => &doctype[open + 1..close],
        _ => &doctype[open + 1..],
    };

    let mut declared: HashMap<&str, &str> = HashMap::new();
    for caps in ENTITY_DECL_RE.captures_iter(subset) {
        let (Some(name), Some(value)) = (caps.get(1), caps.get(2).or_else(|| caps.get(3))) else {
            continue;
        };
        declared.entry(name.as_str()).or_insert(value.as_str());
    }

    let mut entities = HashMap::with_capacity(declared.len());
    let mut chain = Vec::new();
    for name in declared.keys() {
        expand(name, &declared, &mut entities, &mut chain, position)?;
    }
    Ok(entities)
}

/// Expand `name` into `entities`, expanding whatever it refers to first.
fn expand<'a>(
    name: &'a str,
    declared: &HashMap<&'a str, &'a str>,
    entities: &mut HashMap<String, String>,
    chain: &mut Vec<&'a str>,
    position: u64,
) -> Result<()> {
    if entities.contains_key(name) {
        return Ok(());
    }
    if chain.contains(&name) {
        return Err(ScrubError::parse(
            position,
            format!("entity {name} refers to itself"),
        ));
    }
    // Undeclared names are reported by unescape_with in the caller.
    let Some(&raw) = declared.get(name) else {
        return Ok(());
    };

    chain.push(name);
    for caps in ENTITY_REF_RE.captures_iter(raw) {
        let Some(inner) = caps.get(1) else { continue };
        if resolve_predefined_entity(inner.as_str()).is_none() {
            expand(inner.as_str(), declared, entities, chain, position)?;
        }
    }
    chain.pop();

    let value = unescape_with(raw, |n| {
        resolve_predefined_entity(n).or_else(|| entities.get(n).map(String::as_str))
    })
    .map_err(|e| ScrubError::parse(position, format!("entity {name}: {e}")))?
    .into_owned();
    entities.insert(name.to_string(), value);
    Ok(())
}
