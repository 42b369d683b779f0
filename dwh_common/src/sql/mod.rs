//! Our warehouse schema, and the SQL used to build and load it.
//!
//! Tables are described as data, so that the order we create and drop them
//! in can be computed from their foreign keys (see `crate::order`).

use lazy_static::lazy_static;

mod copy;
mod insert;

pub use self::copy::{copy_sources, render_copy, CopySource, JsonPaths};
pub use self::insert::insert_sql;

/// The SQL dialect to generate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dialect {
    /// Amazon Redshift, with sort and distribution keys.
    Redshift,
    /// Plain PostgreSQL, for testing against a local database.
    Postgres,
}

/// What role a table plays in the warehouse.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableKind {
    /// Raw records loaded straight from S3.
    Staging,
    /// An entity referenced by the fact table.
    Dimension,
    /// Song plays.
    Fact,
}

/// A column definition.
#[derive(Clone, Debug)]
pub struct Column {
    /// The column name.
    pub name: &'static str,
    /// The SQL type of the column.
    pub sql_type: &'static str,
    /// Is this column the table's primary key?
    pub primary_key: bool,
    /// Is this column required?
    pub not_null: bool,
    /// Should the database generate values for this column?
    pub identity: bool,
    /// Redshift `SORTKEY`.
    pub sort_key: bool,
    /// Redshift `DISTKEY`.
    pub dist_key: bool,
    /// The `(table, column)` this column refers to.
    pub references: Option<(&'static str, &'static str)>,
}

impl Column {
    /// A nullable column with no keys.
    pub fn new(name: &'static str, sql_type: &'static str) -> Column {
        Column {
            name,
            sql_type,
            primary_key: false,
            not_null: false,
            identity: false,
            sort_key: false,
            dist_key: false,
            references: None,
        }
    }

    /// Mark this column as the primary key.
    pub fn primary_key(mut self) -> Column {
        self.primary_key = true;
        self
    }

    /// Mark this column as `NOT NULL`.
    pub fn not_null(mut self) -> Column {
        self.not_null = true;
        self
    }

    /// Have the database number this column.
    pub fn identity(mut self) -> Column {
        self.identity = true;
        self
    }

    /// Sort the table by this column on Redshift.
    pub fn sort_key(mut self) -> Column {
        self.sort_key = true;
        self
    }

    /// Distribute the table by this column on Redshift.
    pub fn dist_key(mut self) -> Column {
        self.dist_key = true;
        self
    }

    /// Add a foreign key to `table(column)`.
    pub fn references(mut self, table: &'static str, column: &'static str) -> Column {
        self.references = Some((table, column));
        self
    }

    /// Render this column as part of a `CREATE TABLE` statement.
    fn definition(&self, dialect: Dialect) -> String {
        let mut def = format!("{} {}", self.name, self.sql_type);
        match dialect {
            Dialect::Redshift => {
                if self.identity {
                    def.push_str(" IDENTITY(0,1)");
                }
                if self.dist_key {
                    def.push_str(" DISTKEY");
                }
                if self.sort_key {
                    def.push_str(" SORTKEY");
                }
            }
            Dialect::Postgres => {
                if self.identity {
                    def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
                }
            }
        }
        if self.not_null {
            def.push_str(" NOT NULL");
        }
        if self.primary_key {
            def.push_str(" PRIMARY KEY");
        }
        if let Some((table, column)) = self.references {
            def.push_str(&format!(" REFERENCES {}({})", table, column));
        }
        def
    }
}

/// A table definition.
#[derive(Clone, Debug)]
pub struct Table {
    /// The table name.
    pub name: &'static str,
    /// What the table is for.
    pub kind: TableKind,
    /// The table's columns, in order.
    pub columns: Vec<Column>,
}

impl Table {
    /// The tables this table has foreign keys to, excluding itself.
    pub fn references(&self) -> Vec<&'static str> {
        let mut tables = vec![];
        for column in &self.columns {
            if let Some((table, _)) = column.references {
                if table != self.name && !tables.contains(&table) {
                    tables.push(table);
                }
            }
        }
        tables
    }

    /// SQL to drop this table if it exists.
    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.name)
    }

    /// SQL to create this table.
    pub fn create_sql(&self, dialect: Dialect) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.definition(dialect)))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n);", self.name, columns)
    }
}

/// Staging table for event logs.
pub const STAGING_EVENTS: &str = "staging_events";
/// Staging table for song metadata.
pub const STAGING_SONGS: &str = "staging_songs";

lazy_static! {
    static ref CATALOGUE: Vec<Table> = build_catalogue();
}

/// Every table in the warehouse, in declaration order.
pub fn catalogue() -> &'static [Table] {
    &CATALOGUE
}

fn build_catalogue() -> Vec<Table> {
    vec![
        // Field-for-field copies of the JSON in S3. The event column names
        // come from the log JSONPaths file.
        Table {
            name: STAGING_EVENTS,
            kind: TableKind::Staging,
            columns: vec![
                Column::new("artist", "VARCHAR"),
                Column::new("auth", "VARCHAR"),
                Column::new("firstName", "VARCHAR"),
                Column::new("gender", "CHAR(1)"),
                Column::new("itemInSession", "INTEGER"),
                Column::new("lastName", "VARCHAR"),
                Column::new("length", "DECIMAL"),
                Column::new("level", "VARCHAR"),
                Column::new("location", "VARCHAR"),
                Column::new("method", "VARCHAR"),
                Column::new("page", "VARCHAR"),
                Column::new("registration", "FLOAT"),
                Column::new("sessionId", "INTEGER"),
                Column::new("song", "VARCHAR"),
                Column::new("status", "INTEGER"),
                Column::new("ts", "BIGINT"),
                Column::new("userAgent", "VARCHAR"),
                Column::new("userId", "INTEGER"),
            ],
        },
        Table {
            name: STAGING_SONGS,
            kind: TableKind::Staging,
            columns: vec![
                Column::new("num_songs", "INTEGER"),
                Column::new("artist_id", "VARCHAR"),
                Column::new("artist_latitude", "DECIMAL"),
                Column::new("artist_longitude", "DECIMAL"),
                Column::new("artist_location", "VARCHAR"),
                Column::new("artist_name", "VARCHAR"),
                Column::new("song_id", "VARCHAR"),
                Column::new("title", "VARCHAR"),
                Column::new("duration", "DECIMAL"),
                Column::new("year", "INTEGER"),
            ],
        },
        Table {
            name: "time",
            kind: TableKind::Dimension,
            columns: vec![
                Column::new("start_time", "TIMESTAMP").sort_key().primary_key(),
                Column::new("hour", "NUMERIC").not_null(),
                Column::new("day", "NUMERIC").not_null(),
                Column::new("week", "NUMERIC").not_null(),
                Column::new("month", "NUMERIC").not_null(),
                Column::new("year", "NUMERIC").not_null(),
                Column::new("weekday", "NUMERIC").not_null(),
            ],
        },
        Table {
            name: "users",
            kind: TableKind::Dimension,
            columns: vec![
                Column::new("user_id", "INTEGER").sort_key().primary_key(),
                Column::new("first_name", "VARCHAR").not_null(),
                Column::new("last_name", "VARCHAR").not_null(),
                Column::new("gender", "CHAR(1)"),
                Column::new("level", "VARCHAR").not_null(),
            ],
        },
        Table {
            name: "artists",
            kind: TableKind::Dimension,
            columns: vec![
                Column::new("artist_id", "VARCHAR").dist_key().primary_key(),
                Column::new("name", "VARCHAR").not_null(),
                Column::new("location", "VARCHAR"),
                Column::new("latitude", "DECIMAL"),
                Column::new("longitude", "DECIMAL"),
            ],
        },
        Table {
            name: "songs",
            kind: TableKind::Dimension,
            columns: vec![
                Column::new("song_id", "VARCHAR").sort_key().primary_key(),
                Column::new("title", "VARCHAR").not_null(),
                Column::new("artist_id", "VARCHAR")
                    .not_null()
                    .references("artists", "artist_id"),
                Column::new("year", "INTEGER").not_null(),
                Column::new("duration", "DECIMAL").not_null(),
            ],
        },
        Table {
            name: "songplays",
            kind: TableKind::Fact,
            columns: vec![
                Column::new("songplay_id", "INTEGER").identity().primary_key(),
                Column::new("start_time", "TIMESTAMP")
                    .not_null()
                    .sort_key()
                    .references("time", "start_time"),
                Column::new("user_id", "INTEGER")
                    .not_null()
                    .references("users", "user_id"),
                Column::new("level", "VARCHAR"),
                Column::new("song_id", "VARCHAR")
                    .not_null()
                    .references("songs", "song_id"),
                Column::new("artist_id", "VARCHAR")
                    .not_null()
                    .references("artists", "artist_id"),
                Column::new("session_id", "INTEGER").not_null(),
                Column::new("location", "VARCHAR"),
                Column::new("user_agent", "VARCHAR"),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> &'static Table {
        catalogue()
            .iter()
            .find(|t| t.name == name)
            .expect("no such table")
    }

    #[test]
    fn fact_table_references_every_dimension() {
        let mut refs = table("songplays").references();
        refs.sort_unstable();
        assert_eq!(refs, vec!["artists", "songs", "time", "users"]);
        assert_eq!(table("songs").references(), vec!["artists"]);
        assert!(table(STAGING_EVENTS).references().is_empty());
    }

    #[test]
    fn every_warehouse_table_has_a_primary_key() {
        for table in catalogue().iter().filter(|t| t.kind != TableKind::Staging) {
            assert_eq!(
                table.columns.iter().filter(|c| c.primary_key).count(),
                1,
                "{} needs exactly one primary key",
                table.name,
            );
        }
    }

    #[test]
    fn renders_redshift_ddl() {
        let sql = table("songplays").create_sql(Dialect::Redshift);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS songplays (\n"));
        assert!(sql.contains("    songplay_id INTEGER IDENTITY(0,1) PRIMARY KEY,\n"));
        assert!(sql.contains(
            "    start_time TIMESTAMP SORTKEY NOT NULL REFERENCES time(start_time),\n"
        ));
        assert!(sql.ends_with("    user_agent VARCHAR\n);"));

        let sql = table("artists").create_sql(Dialect::Redshift);
        assert!(sql.contains("artist_id VARCHAR DISTKEY PRIMARY KEY"));
    }

    #[test]
    fn renders_postgres_ddl_without_redshift_keys() {
        for table in catalogue() {
            let sql = table.create_sql(Dialect::Postgres);
            assert!(!sql.contains("SORTKEY"), "{}", sql);
            assert!(!sql.contains("DISTKEY"), "{}", sql);
            assert!(!sql.contains("IDENTITY(0,1)"), "{}", sql);
        }
        let sql = table("songplays").create_sql(Dialect::Postgres);
        assert!(sql.contains("songplay_id INTEGER GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"));
    }

    #[test]
    fn drops_are_idempotent() {
        assert_eq!(table("users").drop_sql(), "DROP TABLE IF EXISTS users;");
    }
}
