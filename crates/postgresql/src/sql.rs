//! SQL statement builders.
//!
//! Identifiers from the mapping are always quoted; values always go through
//! numbered parameters.

/// Quote an identifier, treating dots as schema separators.
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One page of the parent table, ordered by id. `$1` = offset, `$2` = limit.
pub fn select_page(table: &str, id_column: &str) -> String {
    format!(
        "SELECT * FROM {} ORDER BY {} OFFSET $1 LIMIT $2",
        quote_ident(table),
        quote_ident(id_column)
    )
}

/// Most parent ids bound into one relation query. The wire protocol caps a
/// statement at 65535 parameters.
pub const MAX_PARENTS_PER_QUERY: usize = 10_000;

/// All child rows of a one-to-many relation for `count` parents.
///
/// Rows of one parent come back in physical order, so an unchanged table
/// always yields the same child sequence.
pub fn select_children(table: &str, foreign_key: &str, count: usize) -> String {
    format!(
        "SELECT * FROM {} WHERE {} IN ({}) ORDER BY {}, ctid",
        quote_ident(table),
        quote_ident(foreign_key),
        placeholders(1, count),
        quote_ident(foreign_key)
    )
}

/// Column alias carrying the parent key in many-to-many reads.
pub const PARENT_KEY_ALIAS: &str = "__parent_key";

/// Far-side rows of a many-to-many relation for `count` parents.
#[allow(clippy::too_many_arguments)]
pub fn select_many_to_many(
    join_table: &str,
    foreign_key: &str,
    far_table: &str,
    far_key: &str,
    join_far_column: &str,
    fields: &[String],
    count: usize,
) -> String {
    let projection = if fields.is_empty() {
        "f.*".to_string()
    } else {
        fields
            .iter()
            .map(|c| format!("f.{}", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "SELECT j.{fk} AS {alias}, {projection} FROM {join} j JOIN {far} f ON j.{jfc} = f.{fkey} WHERE j.{fk} IN ({params}) ORDER BY j.{fk}, f.{fkey}",
        fk = quote_ident(foreign_key),
        alias = quote_ident(PARENT_KEY_ALIAS),
        join = quote_ident(join_table),
        far = quote_ident(far_table),
        jfc = quote_ident(join_far_column),
        fkey = quote_ident(far_key),
        params = placeholders(1, count),
    )
}

/// Native atomic upsert. `$1` is the id, followed by `columns` in order.
///
/// Returns a row with a boolean `inserted` column, except when `columns` is
/// empty and the id already exists.
pub fn upsert(table: &str, id_column: &str, columns: &[&str], identity: bool) -> String {
    let mut all = vec![id_column];
    all.extend_from_slice(columns);

    // Nothing to update when only the id is mapped; an existing row then
    // returns no row at all.
    let conflict_action = if columns.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!(
            "DO UPDATE SET {}",
            columns
                .iter()
                .map(|c| format!("{q} = EXCLUDED.{q}", q = quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    format!(
        "INSERT INTO {} ({}){} VALUES ({}) ON CONFLICT ({}) {} RETURNING (xmax = 0) AS inserted",
        quote_ident(table),
        column_list(&all),
        if identity { " OVERRIDING SYSTEM VALUE" } else { "" },
        placeholders(1, all.len()),
        quote_ident(id_column),
        conflict_action
    )
}

/// Existence probe by id. `$1` = id.
pub fn exists(table: &str, id_column: &str) -> String {
    format!(
        "SELECT 1 FROM {} WHERE {} = $1",
        quote_ident(table),
        quote_ident(id_column)
    )
}

/// Plain insert of `columns` in order.
pub fn insert(table: &str, columns: &[&str], identity: bool) -> String {
    format!(
        "INSERT INTO {} ({}){} VALUES ({})",
        quote_ident(table),
        column_list(columns),
        if identity { " OVERRIDING SYSTEM VALUE" } else { "" },
        placeholders(1, columns.len())
    )
}

/// Update `columns` by id. Columns are `$1..$n`, the id is `$n+1`.
pub fn update(table: &str, id_column: &str, columns: &[&str]) -> String {
    let sets = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", quote_ident(c), i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        quote_ident(table),
        sets,
        quote_ident(id_column),
        columns.len() + 1
    )
}

/// Delete every row whose `column` equals `$1`.
pub fn delete_by(table: &str, column: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = $1",
        quote_ident(table),
        quote_ident(column)
    )
}

/// Resolve far-side keys by natural key. `$1` = natural key value.
pub fn resolve_far_key(far_table: &str, far_key: &str, natural_key: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = $1",
        quote_ident(far_key),
        quote_ident(far_table),
        quote_ident(natural_key)
    )
}

/// Split a possibly schema-qualified table name for catalog lookups.
pub fn split_table(table: &str) -> (Option<&str>, &str) {
    match table.rsplit_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table),
    }
}

/// Whether a column is an identity column. `$1` = table, `$2` = column,
/// `$3` = schema (NULL for the search path's current schema).
pub const IDENTITY_COLUMN: &str = "SELECT is_identity::text FROM information_schema.columns \
     WHERE table_name = $1::text AND column_name = $2::text \
     AND table_schema = COALESCE($3::text, current_schema())";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("app.users"), "\"app\".\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_select_page() {
        assert_eq!(
            select_page("users", "id"),
            "SELECT * FROM \"users\" ORDER BY \"id\" OFFSET $1 LIMIT $2"
        );
    }

    #[test]
    fn test_select_children_binds_every_parent() {
        assert_eq!(
            select_children("orders", "user_id", 3),
            "SELECT * FROM \"orders\" WHERE \"user_id\" IN ($1, $2, $3) ORDER BY \"user_id\", ctid"
        );
    }

    #[test]
    fn test_select_many_to_many_projects_fields() {
        let sql = select_many_to_many(
            "user_roles",
            "user_id",
            "roles",
            "id",
            "role_id",
            &["name".to_string()],
            2,
        );
        assert_eq!(
            sql,
            "SELECT j.\"user_id\" AS \"__parent_key\", f.\"name\" FROM \"user_roles\" j \
             JOIN \"roles\" f ON j.\"role_id\" = f.\"id\" WHERE j.\"user_id\" IN ($1, $2) \
             ORDER BY j.\"user_id\", f.\"id\""
        );

        let all = select_many_to_many("ur", "uid", "r", "id", "rid", &[], 1);
        assert!(all.contains("f.*"));
    }

    #[test]
    fn test_upsert_with_identity_override() {
        assert_eq!(
            upsert("users", "id", &["user_name", "points"], true),
            "INSERT INTO \"users\" (\"id\", \"user_name\", \"points\") OVERRIDING SYSTEM VALUE \
             VALUES ($1, $2, $3) ON CONFLICT (\"id\") DO UPDATE SET \
             \"user_name\" = EXCLUDED.\"user_name\", \"points\" = EXCLUDED.\"points\" \
             RETURNING (xmax = 0) AS inserted"
        );
    }

    #[test]
    fn test_upsert_without_columns_never_updates_id() {
        assert_eq!(
            upsert("users", "id", &[], true),
            "INSERT INTO \"users\" (\"id\") OVERRIDING SYSTEM VALUE VALUES ($1) \
             ON CONFLICT (\"id\") DO NOTHING RETURNING (xmax = 0) AS inserted"
        );
        assert!(!upsert("users", "id", &[], false).contains("OVERRIDING"));
    }

    #[test]
    fn test_parent_chunk_fits_parameter_limit() {
        let sql = select_children("orders", "user_id", MAX_PARENTS_PER_QUERY);
        assert!(sql.contains(&format!("${MAX_PARENTS_PER_QUERY})")));
    }

    #[test]
    fn test_update_numbers_id_last() {
        assert_eq!(
            update("users", "id", &["a", "b"]),
            "UPDATE \"users\" SET \"a\" = $1, \"b\" = $2 WHERE \"id\" = $3"
        );
    }

    #[test]
    fn test_insert_and_delete() {
        assert_eq!(
            insert("orders", &["user_id", "total"], false),
            "INSERT INTO \"orders\" (\"user_id\", \"total\") VALUES ($1, $2)"
        );
        assert_eq!(
            delete_by("user_roles", "user_id"),
            "DELETE FROM \"user_roles\" WHERE \"user_id\" = $1"
        );
    }

    #[test]
    fn test_split_table() {
        assert_eq!(split_table("app.users"), (Some("app"), "users"));
        assert_eq!(split_table("users"), (None, "users"));
    }
}
