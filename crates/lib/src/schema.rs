//! # Schema Registry
//!
//! A static description of the queryable tables. The rule matcher, the prompt
//! builder and the validator all read the same `SchemaDescriptor`, which is built
//! once at startup and shared read-only for the life of the process.

use std::fmt::Write;

/// A single column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub check: Option<String>,
}

impl ColumnDescriptor {
    /// A `NOT NULL` column of the given type.
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_uppercase(),
            nullable: false,
            primary_key: false,
            check: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn check(mut self, expression: &str) -> Self {
        self.check = Some(expression.to_string());
        self
    }

    fn to_ddl(&self) -> String {
        let mut ddl = format!("{} {}", self.name, self.sql_type);
        if self.primary_key {
            ddl.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            ddl.push_str(" NOT NULL");
        }
        if let Some(check) = &self.check {
            let _ = write!(ddl, " CHECK({check})");
        }
        ddl
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// A table with its columns (in declaration order) and foreign keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn foreign_key(mut self, column: &str, referenced_table: &str, referenced_column: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.to_string(),
            referenced_table: referenced_table.to_string(),
            referenced_column: referenced_column.to_string(),
        });
        self
    }

    /// Case-insensitive column lookup, matching SQLite's identifier rules.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    /// Renders the table as a `CREATE TABLE` statement.
    pub fn to_ddl(&self) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.to_ddl()))
            .collect();
        lines.extend(self.foreign_keys.iter().map(|fk| {
            format!(
                "    FOREIGN KEY ({}) REFERENCES {}({})",
                fk.column, fk.referenced_table, fk.referenced_column
            )
        }));
        format!("CREATE TABLE {} (\n{}\n);", self.name, lines.join(",\n"))
    }
}

/// The known literal values of one column, stored lower-cased.
///
/// Rules only substitute literals found in a domain, so an unknown value in a
/// question turns into a non-match rather than a malformed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDomain {
    pub table: String,
    pub column: String,
    pub values: Vec<String>,
}

/// The full, immutable description of the queryable schema.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaDescriptor {
    tables: Vec<TableDescriptor>,
    domains: Vec<ValueDomain>,
}

impl SchemaDescriptor {
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        Self {
            tables,
            domains: Vec::new(),
        }
    }

    /// Attaches a value domain to `table.column`. Values are lower-cased.
    pub fn with_domain(mut self, table: &str, column: &str, values: &[&str]) -> Self {
        self.domains.push(ValueDomain {
            table: table.to_string(),
            column: column.to_string(),
            values: values.iter().map(|v| v.to_lowercase()).collect(),
        });
        self
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn domains(&self) -> &[ValueDomain] {
        &self.domains
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// True if any table declares a column with this name.
    pub fn has_column_anywhere(&self, column: &str) -> bool {
        self.tables.iter().any(|t| t.has_column(column))
    }

    pub fn domain(&self, table: &str, column: &str) -> Option<&[String]> {
        self.domains
            .iter()
            .find(|d| d.table.eq_ignore_ascii_case(table) && d.column.eq_ignore_ascii_case(column))
            .map(|d| d.values.as_slice())
    }

    /// Renders every table as DDL, in declaration order, separated by a blank line.
    pub fn render_ddl(&self) -> String {
        self.tables
            .iter()
            .map(TableDescriptor::to_ddl)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Lists every table and column of `self` that `actual` lacks.
    pub fn missing_from(&self, actual: &SchemaDescriptor) -> Vec<String> {
        let mut missing = Vec::new();
        for table in &self.tables {
            match actual.table(&table.name) {
                None => missing.push(format!("table '{}'", table.name)),
                Some(found) => missing.extend(
                    table
                        .columns
                        .iter()
                        .filter(|c| !found.has_column(&c.name))
                        .map(|c| format!("column '{}.{}'", table.name, c.name)),
                ),
            }
        }
        missing
    }

    /// The sales catalog the service is deployed against: products and their sales.
    pub fn sales() -> Self {
        let products = TableDescriptor::new("products")
            .column(ColumnDescriptor::new("id", "INTEGER").primary_key())
            .column(ColumnDescriptor::new("name", "TEXT"))
            .column(ColumnDescriptor::new("category", "TEXT"))
            .column(ColumnDescriptor::new("price", "REAL").check("price >= 0"));

        let sales = TableDescriptor::new("sales")
            .column(ColumnDescriptor::new("id", "INTEGER").primary_key())
            .column(ColumnDescriptor::new("product_id", "INTEGER"))
            .column(ColumnDescriptor::new("quantity", "INTEGER").check("quantity > 0"))
            .column(ColumnDescriptor::new("sale_date", "TEXT"))
            .column(ColumnDescriptor::new("region", "TEXT"))
            .foreign_key("product_id", "products", "id");

        SchemaDescriptor::new(vec![products, sales])
            .with_domain(
                "products",
                "name",
                &[
                    "gaming laptop",
                    "mechanical keyboard",
                    "wireless mouse",
                    "monitor",
                    "headphones",
                    "smartphone",
                    "smartwatch",
                    "router",
                    "chair",
                    "desk",
                    "lamp",
                    "bookshelf",
                    "coffee table",
                    "water bottle",
                    "backpack",
                    "phone case",
                    "running shoes",
                    "hoodie",
                    "ssd",
                    "docking station",
                ],
            )
            .with_domain(
                "products",
                "category",
                &["electronics", "furniture", "accessories", "apparel"],
            )
            .with_domain(
                "sales",
                "region",
                &["north", "south", "east", "west", "central"],
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_ddl_includes_constraints_and_foreign_keys() {
        let ddl = SchemaDescriptor::sales().render_ddl();
        let expected = "CREATE TABLE products (\n    id INTEGER PRIMARY KEY,\n    name TEXT NOT NULL,\n    category TEXT NOT NULL,\n    price REAL NOT NULL CHECK(price >= 0)\n);\n\nCREATE TABLE sales (\n    id INTEGER PRIMARY KEY,\n    product_id INTEGER NOT NULL,\n    quantity INTEGER NOT NULL CHECK(quantity > 0),\n    sale_date TEXT NOT NULL,\n    region TEXT NOT NULL,\n    FOREIGN KEY (product_id) REFERENCES products(id)\n);";
        assert_eq!(ddl, expected);
    }

    #[test]
    fn test_lookups_are_case_insensitive() {
        let schema = SchemaDescriptor::sales();
        assert!(schema.has_table("PRODUCTS"));
        assert!(schema.table("Sales").unwrap().has_column("Sale_Date"));
        assert!(schema.has_column_anywhere("quantity"));
        assert!(!schema.has_column_anywhere("discount"));
        assert_eq!(schema.domain("SALES", "region").unwrap().len(), 5);
    }

    #[test]
    fn test_missing_from_reports_tables_and_columns() {
        let expected = SchemaDescriptor::sales();
        let actual = SchemaDescriptor::new(vec![TableDescriptor::new("products")
            .column(ColumnDescriptor::new("id", "INTEGER"))
            .column(ColumnDescriptor::new("name", "TEXT"))]);

        let missing = expected.missing_from(&actual);
        assert_eq!(
            missing,
            vec![
                "column 'products.category'".to_string(),
                "column 'products.price'".to_string(),
                "table 'sales'".to_string(),
            ]
        );
        assert!(expected.missing_from(&expected).is_empty());
    }
}
