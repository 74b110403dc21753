//! # Queue SQL Statements
//!
//! Statement templates for the slot-ring protocol, substituted with the
//! qualified table name when a queue handle is constructed.
//!
//! Claims rely on `FOR UPDATE SKIP LOCKED`: the selected slot is locked at
//! row level, rows locked by concurrent claimants are skipped rather than
//! waited on, and no escalation to page or table locks occurs. The CTE joins
//! the pre-update column values back into `RETURNING`, so a receive returns
//! the row exactly as it was claimed.

/// Claim one occupied slot past the cursor and empty it, returning the
/// previous contents. `$1` = cursor seq.
pub const RECEIVE_TEXT: &str = r#"
WITH claimed AS (
    SELECT seq, message_id, headers, body
    FROM {table}
    WHERE has_message AND seq > $1
    ORDER BY seq
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
UPDATE {table} AS q
SET has_message = FALSE, message_id = NULL, headers = NULL, body = NULL
FROM claimed
WHERE q.seq = claimed.seq
RETURNING claimed.seq, claimed.message_id, claimed.headers, claimed.body
"#;

/// Claim one free slot past the cursor and fill it, returning its seq.
/// `$1` = cursor seq, `$2` = message id, `$3` = headers blob, `$4` = body.
pub const SEND_TEXT: &str = r#"
WITH slot AS (
    SELECT seq
    FROM {table}
    WHERE NOT has_message AND seq > $1
    ORDER BY seq
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
UPDATE {table} AS q
SET has_message = TRUE, message_id = $2, headers = $3, body = $4
FROM slot
WHERE q.seq = slot.seq
RETURNING slot.seq
"#;

/// Minimum seq among slots in the given occupancy state; the wraparound
/// fallback for both scans. `$1` = has_message.
pub const NEXT_SEQ_TEXT: &str = "SELECT MIN(seq) FROM {table} WHERE has_message = $1";

/// Reset every occupied slot to empty.
pub const PURGE_TEXT: &str = r#"
UPDATE {table}
SET has_message = FALSE, message_id = NULL, headers = NULL, body = NULL
WHERE has_message
"#;

/// Ring table definition. Capacity is fixed by seeding; the engine never
/// inserts or deletes slots afterwards.
pub const CREATE_TABLE_TEXT: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    seq integer PRIMARY KEY,
    has_message boolean NOT NULL DEFAULT FALSE,
    message_id varchar(200),
    headers text,
    body bytea
)
"#;

/// Seed the ring with empty slots, idempotently. `$1` = slot count.
pub const SEED_SLOTS_TEXT: &str = r#"
INSERT INTO {table} (seq, has_message)
SELECT gs, FALSE FROM generate_series(0, $1 - 1) AS gs
ON CONFLICT (seq) DO NOTHING
"#;

/// Substitute the qualified table name into a template.
pub fn for_table(template: &str, qualified_table: &str) -> String {
    template.replace("{table}", qualified_table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_replaces_every_placeholder() {
        let sql = for_table(RECEIVE_TEXT, "\"public\".\"orders\"");
        assert!(!sql.contains("{table}"));
        assert_eq!(sql.matches("\"public\".\"orders\"").count(), 2);
    }

    #[test]
    fn claims_skip_locked_rows() {
        assert!(RECEIVE_TEXT.contains("FOR UPDATE SKIP LOCKED"));
        assert!(SEND_TEXT.contains("FOR UPDATE SKIP LOCKED"));
    }

    #[test]
    fn receive_returns_previous_row_values() {
        // RETURNING must reference the CTE columns, not the updated row.
        assert!(RECEIVE_TEXT.contains("RETURNING claimed.seq"));
    }
}
