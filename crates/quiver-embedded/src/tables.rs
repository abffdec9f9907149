//! redb table definitions for the embedded engine.
//!
//! Global tables have fixed names. Each named database owns a set of tables
//! whose names are prefixed with the lowercased database name, so
//! `Northwind` stores its documents in `northwind/docs`.

use redb::TableDefinition;

/// Every database a handle has been scoped to, keyed by lowercased name.
/// Values hold the name with its original casing.
pub const DATABASES: TableDefinition<&str, &str> = TableDefinition::new("databases");

/// Engine-wide counters.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// `META` key of the last etag sequence handed out.
pub const LAST_ETAG: &str = "last_etag";

/// Table names belonging to one database.
#[derive(Debug, Clone)]
pub struct DatabaseTables {
    pub docs: String,
    pub attachments: String,
    pub attachment_data: String,
    pub indexes: String,
}

impl DatabaseTables {
    pub fn new(database: &str) -> Self {
        let prefix = database.to_lowercase();
        Self {
            docs: format!("{prefix}/docs"),
            attachments: format!("{prefix}/attachments"),
            attachment_data: format!("{prefix}/attachment_data"),
            indexes: format!("{prefix}/indexes"),
        }
    }

    /// Documents keyed by lowercased document key, JSON values.
    pub fn docs(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.docs)
    }

    /// Attachment headers keyed by lowercased attachment key, JSON values.
    pub fn attachments(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.attachments)
    }

    /// Raw attachment payloads, same keys as `attachments`.
    pub fn attachment_data(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.attachment_data)
    }

    /// Index definitions keyed by lowercased index name, JSON values.
    pub fn indexes(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_prefixed_with_lowercased_database() {
        let tables = DatabaseTables::new("Northwind");
        assert_eq!(tables.docs, "northwind/docs");
        assert_eq!(tables.attachments, "northwind/attachments");
        assert_eq!(tables.attachment_data, "northwind/attachment_data");
        assert_eq!(tables.indexes, "northwind/indexes");
    }
}
