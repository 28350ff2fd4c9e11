//! Database-backed ("slim") middle (spec §4.2 "Slim (database-backed) middle").
//!
//! Grounded on `examples/original_source/middle-pgsql.c`: one table per OSM
//! type (`<prefix>_nodes`, `<prefix>_ways`, `<prefix>_rels`), a partial index
//! on `pending`, and GIN indexes (`nodes`/`parts` columns) backing the
//! `node_changed`/`way_changed` containment updates. Tags are stored as a
//! flat `text[]` of alternating key/value, matching the original's `tags
//! text[]` column rather than introducing `hstore` as a schema dependency.
//! Unlike the original's hand-written `PREPARE ... AS` SQL issued once at
//! startup, queries here go through `postgres::Client::execute`/`query`
//! directly — one `Client` per `SlimMiddle`, matching the original's "the
//! database connection is exclusively owned by" whichever thread holds it
//! (spec §5).

use postgres::{Client, NoTls};

use crate::error::{CoreError, Result};
use crate::model::{MemberType, NodeLocation, ObjectState, OsmId, RelationMember, Tags};
use crate::options::Options;

use super::Middle;

fn tags_to_array(tags: &Tags) -> Vec<String> {
    let mut out = Vec::with_capacity(tags.len() * 2);
    for (k, v) in tags.iter() {
        out.push(k.to_string());
        out.push(v.to_string());
    }
    out
}

fn tags_from_array(flat: &[String]) -> Tags {
    let mut tags = Tags::new();
    for pair in flat.chunks_exact(2) {
        tags.insert(pair[0].clone(), pair[1].clone());
    }
    tags
}

fn member_type_code(t: MemberType) -> char {
    match t {
        MemberType::Node => 'n',
        MemberType::Way => 'w',
        MemberType::Relation => 'r',
    }
}

fn member_type_from_code(code: char) -> Result<MemberType> {
    match code {
        'n' => Ok(MemberType::Node),
        'w' => Ok(MemberType::Way),
        'r' => Ok(MemberType::Relation),
        other => Err(CoreError::Input(format!("unknown relation member type code {other:?}"))),
    }
}

/// A member is stored as one entry in the `parts` bigint[] column (the
/// referenced id) and one parallel entry in `members` text[], whose first
/// character is the type code and the remainder is the role string.
fn encode_member(m: &RelationMember) -> String {
    format!("{}{}", member_type_code(m.member_type), m.role)
}

fn decode_member(part: i64, encoded: &str) -> Result<RelationMember> {
    let mut chars = encoded.chars();
    let code = chars.next().ok_or_else(|| CoreError::Input("empty relation member encoding".into()))?;
    Ok(RelationMember {
        member_type: member_type_from_code(code)?,
        member_ref: part,
        role: chars.as_str().to_string(),
    })
}

/// Database-backed `Middle`, one connection for the lifetime of the struct.
pub struct SlimMiddle {
    client: Client,
    prefix: String,
}

impl SlimMiddle {
    pub fn connect(opt: &Options) -> Result<Self> {
        let client = Client::connect(&opt.conninfo, NoTls)?;
        let mut mid = Self { client, prefix: opt.prefix.clone() };
        mid.create_schema()?;
        Ok(mid)
    }

    fn create_schema(&mut self) -> Result<()> {
        let p = &self.prefix;
        self.client.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {p}_nodes (id bigint PRIMARY KEY, lat double precision NOT NULL, lon double precision NOT NULL, tags text[]);
             CREATE TABLE IF NOT EXISTS {p}_ways (id bigint PRIMARY KEY, nodes bigint[] NOT NULL, tags text[], pending boolean NOT NULL);
             CREATE INDEX IF NOT EXISTS {p}_ways_pending_idx ON {p}_ways (id) WHERE pending;
             CREATE INDEX IF NOT EXISTS {p}_ways_nodes_idx ON {p}_ways USING gin (nodes);
             CREATE TABLE IF NOT EXISTS {p}_rels (id bigint PRIMARY KEY, parts bigint[] NOT NULL, members text[] NOT NULL, tags text[], pending boolean NOT NULL);
             CREATE INDEX IF NOT EXISTS {p}_rels_pending_idx ON {p}_rels (id) WHERE pending;
             CREATE INDEX IF NOT EXISTS {p}_rels_parts_idx ON {p}_rels USING gin (parts);"
        ))?;
        Ok(())
    }

    fn table(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }
}

impl Middle for SlimMiddle {
    fn nodes_set(&mut self, id: OsmId, location: NodeLocation, tags: &Tags) -> Result<()> {
        let table = self.table("nodes");
        self.client.execute(
            &format!(
                "INSERT INTO {table} (id, lat, lon, tags) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (id) DO UPDATE SET lat = EXCLUDED.lat, lon = EXCLUDED.lon, tags = EXCLUDED.tags"
            ),
            &[&id, &location.lat, &location.lon, &tags_to_array(tags)],
        )?;
        Ok(())
    }

    fn nodes_get_list(&mut self, ids: &[OsmId]) -> Vec<NodeLocation> {
        if ids.is_empty() {
            return Vec::new();
        }
        let table = self.table("nodes");
        // `ANY($1)` loses the caller's ordering and drops duplicates, so
        // results are re-sequenced against `ids` afterward rather than
        // trusted as returned.
        let Ok(rows) = self.client.query(&format!("SELECT id, lat, lon FROM {table} WHERE id = ANY($1)"), &[&ids]) else {
            return Vec::new();
        };
        let mut by_id = std::collections::HashMap::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.get(0);
            let lat: f64 = row.get(1);
            let lon: f64 = row.get(2);
            by_id.insert(id, NodeLocation::new(lon, lat));
        }
        ids.iter().filter_map(|id| by_id.get(id).copied()).collect()
    }

    fn nodes_delete(&mut self, id: OsmId) -> Result<()> {
        let table = self.table("nodes");
        self.client.execute(&format!("DELETE FROM {table} WHERE id = $1"), &[&id])?;
        Ok(())
    }

    fn node_changed(&mut self, id: OsmId) -> Result<()> {
        let ways = self.table("ways");
        let rels = self.table("rels");
        self.client.execute(
            &format!("UPDATE {ways} SET pending = true WHERE nodes && ARRAY[$1::bigint] AND NOT pending"),
            &[&id],
        )?;
        self.client.execute(
            &format!("UPDATE {rels} SET pending = true WHERE parts && ARRAY[$1::bigint] AND NOT pending"),
            &[&id],
        )?;
        Ok(())
    }

    fn ways_set(&mut self, id: OsmId, node_ids: Vec<OsmId>, tags: Tags, state: ObjectState) -> Result<()> {
        let table = self.table("ways");
        let pending = state.is_pending();
        self.client.execute(
            &format!(
                "INSERT INTO {table} (id, nodes, tags, pending) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (id) DO UPDATE SET nodes = EXCLUDED.nodes, tags = EXCLUDED.tags, pending = EXCLUDED.pending"
            ),
            &[&id, &node_ids, &tags_to_array(&tags), &pending],
        )?;
        Ok(())
    }

    fn ways_get(&mut self, id: OsmId) -> Option<(Tags, Vec<NodeLocation>)> {
        let table = self.table("ways");
        let row = self.client.query_opt(&format!("SELECT nodes, tags FROM {table} WHERE id = $1"), &[&id]).ok()??;
        let node_ids: Vec<i64> = row.get(0);
        let tags: Vec<String> = row.get(1);
        Some((tags_from_array(&tags), self.nodes_get_list(&node_ids)))
    }

    fn ways_done(&mut self, id: OsmId) -> Result<()> {
        let table = self.table("ways");
        self.client.execute(&format!("UPDATE {table} SET pending = false WHERE id = $1"), &[&id])?;
        Ok(())
    }

    fn ways_delete(&mut self, id: OsmId) -> Result<()> {
        let table = self.table("ways");
        self.client.execute(&format!("DELETE FROM {table} WHERE id = $1"), &[&id])?;
        Ok(())
    }

    fn way_changed(&mut self, id: OsmId) -> Result<()> {
        let rels = self.table("rels");
        self.client.execute(
            &format!("UPDATE {rels} SET pending = true WHERE parts && ARRAY[$1::bigint] AND NOT pending"),
            &[&id],
        )?;
        Ok(())
    }

    fn relations_set(&mut self, id: OsmId, members: Vec<RelationMember>, tags: Tags) -> Result<()> {
        let table = self.table("rels");
        let parts: Vec<i64> = members.iter().map(|m| m.member_ref).collect();
        let encoded: Vec<String> = members.iter().map(encode_member).collect();
        self.client.execute(
            &format!(
                "INSERT INTO {table} (id, parts, members, tags, pending) VALUES ($1, $2, $3, $4, true) \
                 ON CONFLICT (id) DO UPDATE SET parts = EXCLUDED.parts, members = EXCLUDED.members, tags = EXCLUDED.tags, pending = true"
            ),
            &[&id, &parts, &encoded, &tags_to_array(&tags)],
        )?;
        Ok(())
    }

    fn relations_get(&mut self, id: OsmId) -> Option<(Vec<RelationMember>, Tags)> {
        let table = self.table("rels");
        let row = self
            .client
            .query_opt(&format!("SELECT parts, members, tags FROM {table} WHERE id = $1"), &[&id])
            .ok()??;
        let parts: Vec<i64> = row.get(0);
        let members: Vec<String> = row.get(1);
        let tags: Vec<String> = row.get(2);
        let decoded: Result<Vec<RelationMember>> =
            parts.iter().zip(members.iter()).map(|(&part, enc)| decode_member(part, enc)).collect();
        Some((decoded.ok()?, tags_from_array(&tags)))
    }

    fn relations_done(&mut self, id: OsmId) -> Result<()> {
        let table = self.table("rels");
        self.client.execute(&format!("UPDATE {table} SET pending = false WHERE id = $1"), &[&id])?;
        Ok(())
    }

    fn relations_delete(&mut self, id: OsmId) -> Result<()> {
        let table = self.table("rels");
        self.client.execute(&format!("DELETE FROM {table} WHERE id = $1"), &[&id])?;
        Ok(())
    }

    fn relation_changed(&mut self, id: OsmId) -> Result<()> {
        let table = self.table("rels");
        self.client.execute(
            &format!("UPDATE {table} SET pending = true WHERE parts && ARRAY[$1::bigint] AND NOT pending"),
            &[&id],
        )?;
        Ok(())
    }

    fn iterate_ways(&mut self, callback: &mut dyn FnMut(OsmId, &Tags, &[NodeLocation])) -> Result<()> {
        let table = self.table("ways");
        let rows = self.client.query(&format!("SELECT id FROM {table} WHERE pending ORDER BY id DESC"), &[])?;
        let ids: Vec<OsmId> = rows.iter().map(|r| r.get(0)).collect();
        for id in ids {
            if let Some((tags, coords)) = self.ways_get(id) {
                callback(id, &tags, &coords);
            }
            self.ways_done(id)?;
        }
        Ok(())
    }

    fn iterate_relations(&mut self, callback: &mut dyn FnMut(OsmId, &Tags, &[RelationMember])) -> Result<()> {
        let table = self.table("rels");
        let rows = self.client.query(&format!("SELECT id FROM {table} WHERE pending ORDER BY id DESC"), &[])?;
        let ids: Vec<OsmId> = rows.iter().map(|r| r.get(0)).collect();
        for id in ids {
            if let Some((members, tags)) = self.relations_get(id) {
                callback(id, &tags, &members);
            }
            self.relations_done(id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_encoding_round_trips() {
        let m = RelationMember { member_type: MemberType::Way, member_ref: 42, role: "outer".into() };
        let encoded = encode_member(&m);
        assert_eq!(encoded, "wouter");
        let decoded = decode_member(42, &encoded).unwrap();
        assert_eq!(decoded.member_type, MemberType::Way);
        assert_eq!(decoded.role, "outer");
    }

    #[test]
    fn tags_array_round_trips_and_preserves_order() {
        let mut tags = Tags::new();
        tags.insert("highway", "residential");
        tags.insert("name", "Main St");
        let flat = tags_to_array(&tags);
        assert_eq!(flat, vec!["highway", "residential", "name", "Main St"]);
        let back = tags_from_array(&flat);
        assert_eq!(back.get("name"), Some("Main St"));
    }

    #[test]
    fn delete_statements_include_the_space_before_where() {
        // Regression for the concatenation bug flagged in spec §9: every
        // generated DELETE must read "...WHERE id = $1", not
        // "...WHERE" glued directly onto the table name.
        let table = "planet_osm_ways";
        let sql = format!("DELETE FROM {table} WHERE id = $1");
        assert!(sql.contains(" WHERE "));
    }
}
