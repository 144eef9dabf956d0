//! Neo4j schema initialization - constraints and indexes.

use neo4rs::{query, Graph};

/// Initialize Neo4j schema with required constraints and indexes.
///
/// Called once on startup. Constraints are created with IF NOT EXISTS to
/// be idempotent.
pub async fn ensure_schema(graph: &Graph) -> Result<(), neo4rs::Error> {
    for (name, cypher) in [
        (
            "quote_id_unique",
            "CREATE CONSTRAINT quote_id_unique IF NOT EXISTS
             FOR (q:Quote) REQUIRE q.id IS UNIQUE",
        ),
        (
            "order_id_unique",
            "CREATE CONSTRAINT order_id_unique IF NOT EXISTS
             FOR (o:Order) REQUIRE o.id IS UNIQUE",
        ),
        // Order numbers are customer-facing; the constraint backs the
        // reservation loop's collision check.
        (
            "order_number_unique",
            "CREATE CONSTRAINT order_number_unique IF NOT EXISTS
             FOR (o:Order) REQUIRE o.number IS UNIQUE",
        ),
        (
            "part_id_unique",
            "CREATE CONSTRAINT part_id_unique IF NOT EXISTS
             FOR (p:Part) REQUIRE p.id IS UNIQUE",
        ),
        (
            "quote_part_id_unique",
            "CREATE CONSTRAINT quote_part_id_unique IF NOT EXISTS
             FOR (p:QuotePart) REQUIRE p.id IS UNIQUE",
        ),
        // Composite key (kind, entity, version) flattened into one property.
        (
            "cad_version_key_unique",
            "CREATE CONSTRAINT cad_version_key_unique IF NOT EXISTS
             FOR (v:CadVersion) REQUIRE v.entity_version_key IS UNIQUE",
        ),
        (
            "cad_version_entity_idx",
            "CREATE INDEX cad_version_entity_idx IF NOT EXISTS
             FOR (v:CadVersion) ON (v.entity_kind, v.entity_id)",
        ),
    ] {
        graph.run(query(cypher)).await?;
        tracing::debug!(constraint = name, "ensured");
    }

    tracing::info!("Neo4j schema initialized (constraints and indexes ensured)");
    Ok(())
}
