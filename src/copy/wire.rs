//! COPY text-format wire encoding (spec §4.3): tab-separated rows,
//! backslash escaping, `\N` for SQL NULL, and the doubled escaping a
//! hash/tag column needs because it nests one syntax (`"k"=>"v"` pairs)
//! inside another (the COPY text format itself).
//!
//! Grounded on `examples/original_source/db-copy.hpp`'s `add_column`
//! helpers and the hstore-style tag serialization `middle-pgsql.c` builds
//! before handing rows to COPY.

use crate::ewkb;
use crate::model::Tags;

/// Escapes one column value for the PostgreSQL COPY text format: `\`,
/// tab, newline and carriage return each become a backslash escape.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// The literal SQL NULL marker in COPY text format.
pub const NULL: &str = "\\N";

/// Encodes a tag set as a PostgreSQL `hstore` text literal:
/// `"k1"=>"v1","k2"=>"v2"`. Quotes and backslashes inside a key or value
/// are backslash-escaped for hstore's own syntax first, and the whole
/// result is then escaped again by [`escape_text`] for the COPY line it
/// rides in — a literal backslash in a tag value therefore ends up
/// quadrupled on the wire.
pub fn encode_hash(tags: &Tags) -> String {
    let mut parts = Vec::with_capacity(tags.len());
    for (k, v) in tags.iter() {
        parts.push(format!("\"{}\"=>\"{}\"", escape_hstore(k), escape_hstore(v)));
    }
    escape_text(&parts.join(","))
}

fn escape_hstore(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// Encodes a geometry as an EWKB hex COPY column value, or [`NULL`] when
/// construction failed upstream.
pub fn encode_geometry_hex(geom: &geo::Geometry<f64>, srid: i32) -> crate::error::Result<String> {
    ewkb::encode_hex(geom, srid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_tab_newline_and_backslash() {
        assert_eq!(escape_text("a\tb\nc\\d"), "a\\tb\\nc\\\\d");
    }

    #[test]
    fn hash_encodes_simple_tags() {
        let mut tags = Tags::new();
        tags.insert("highway".into(), "residential".into());
        assert_eq!(encode_hash(&tags), "\"highway\"=>\"residential\"");
    }

    #[test]
    fn hash_value_with_backslash_is_quadrupled() {
        let mut tags = Tags::new();
        tags.insert("note".into(), "a\\b".into());
        // hstore-escape: a\b -> a\\b ; COPY-escape of that: a\\\\b
        assert_eq!(encode_hash(&tags), "\"note\"=>\"a\\\\\\\\b\"");
    }

    #[test]
    fn hash_value_with_quote_is_escaped() {
        let mut tags = Tags::new();
        tags.insert("name".into(), "6\" pipe".into());
        assert_eq!(encode_hash(&tags), "\"name\"=>\"6\\\" pipe\"");
    }
}
