//! Query Builder SQL generation
//!
//! A single renderer produces both the parameterised form used for execution
//! and the inlined form used for logging and tests.

use serde_json::Value;

use super::builder::QueryBuilder;
use super::types::*;

/// Accumulates SQL text and either binds or inlines values
struct SqlWriter {
    sql: String,
    params: Vec<Value>,
    inline: bool,
}

impl SqlWriter {
    fn new(inline: bool) -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            inline,
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn value(&mut self, value: &Value) {
        if self.inline {
            self.sql.push_str(&format_value(value));
        } else {
            self.params.push(value.clone());
            self.sql.push_str(&format!("${}", self.params.len()));
        }
    }
}

impl QueryBuilder {
    /// Generate SQL from query with parameter placeholders and return parameters
    pub fn to_sql_with_params(&self) -> (String, Vec<Value>) {
        let mut writer = SqlWriter::new(false);
        self.write_statement(&mut writer);
        (writer.sql, writer.params)
    }

    /// Render the query with every value inlined and escaped
    pub fn to_sql(&self) -> String {
        let mut writer = SqlWriter::new(true);
        self.write_statement(&mut writer);
        writer.sql
    }

    fn write_statement(&self, w: &mut SqlWriter) {
        match self.query_type {
            QueryType::Select => self.write_select(w),
            QueryType::Insert => self.write_insert(w),
            QueryType::Update => self.write_update(w),
        }
    }

    fn write_select(&self, w: &mut SqlWriter) {
        w.push(if self.distinct { "SELECT DISTINCT " } else { "SELECT " });

        if self.select_fields.is_empty() {
            w.push("*");
        } else {
            w.push(&self.select_fields.join(", "));
        }

        if let Some(table) = &self.from_table {
            w.push(" FROM ");
            w.push(table);
        }

        for join in &self.joins {
            w.push(&format!(
                " {} {} ON {} {} {}",
                join.join_type, join.table, join.first, join.operator, join.second
            ));
        }

        self.write_where(w);

        if !self.order_by.is_empty() {
            let order_clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction))
                .collect();
            w.push(" ORDER BY ");
            w.push(&order_clauses.join(", "));
        }

        if let Some(limit) = self.limit_count {
            w.push(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset_value {
            w.push(&format!(" OFFSET {}", offset));
        }
    }

    fn write_insert(&self, w: &mut SqlWriter) {
        let Some(table) = &self.insert_table else {
            return;
        };
        w.push(&format!("INSERT INTO {}", table));

        if self.set_clauses.is_empty() {
            w.push(" DEFAULT VALUES");
        } else {
            let columns: Vec<&str> = self
                .set_clauses
                .iter()
                .map(|clause| clause.column.as_str())
                .collect();
            w.push(&format!(" ({}) VALUES (", columns.join(", ")));
            for (i, clause) in self.set_clauses.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.value(&clause.value);
            }
            w.push(")");
        }

        if let Some(column) = &self.returning {
            w.push(&format!(" RETURNING {}", column));
        }
    }

    fn write_update(&self, w: &mut SqlWriter) {
        let Some(table) = &self.update_table else {
            return;
        };
        w.push(&format!("UPDATE {}", table));

        if !self.set_clauses.is_empty() {
            w.push(" SET ");
            for (i, clause) in self.set_clauses.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.push(&format!("{} = ", clause.column));
                w.value(&clause.value);
            }
        }

        self.write_where(w);
    }

    fn write_where(&self, w: &mut SqlWriter) {
        if self.where_conditions.is_empty() {
            return;
        }

        w.push(" WHERE ");
        write_conditions(&self.where_conditions, w);
    }
}

fn write_conditions(conditions: &[WhereCondition], w: &mut SqlWriter) {
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            w.push(&format!(" {} ", condition.boolean));
        }
        write_condition(&condition.kind, w);
    }
}

fn write_condition(kind: &WhereKind, w: &mut SqlWriter) {
    match kind {
        WhereKind::Basic {
            column,
            operator,
            value,
        } => {
            w.push(&format!("{} {} ", column, operator));
            w.value(value);
        }
        WhereKind::In {
            column,
            values,
            negated,
        } => {
            if values.is_empty() {
                w.push(if *negated { "1 = 1" } else { "1 = 0" });
                return;
            }
            w.push(&format!(
                "{} {} (",
                column,
                if *negated { "NOT IN" } else { "IN" }
            ));
            for (j, value) in values.iter().enumerate() {
                if j > 0 {
                    w.push(", ");
                }
                w.value(value);
            }
            w.push(")");
        }
        WhereKind::Null { column, negated } => {
            w.push(&format!(
                "{} {}",
                column,
                if *negated { "IS NOT NULL" } else { "IS NULL" }
            ));
        }
        WhereKind::Column {
            first,
            operator,
            second,
        } => {
            w.push(&format!("{} {} {}", first, operator, second));
        }
        WhereKind::Raw(sql) => w.push(sql),
        WhereKind::Subquery {
            query,
            operator,
            value,
        } => {
            w.push("(");
            query.write_statement(w);
            w.push(&format!(") {} ", operator));
            w.value(value);
        }
        WhereKind::Exists { query, negated } => {
            w.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
            query.write_statement(w);
            w.push(")");
        }
        WhereKind::Nested(conditions) => {
            w.push("(");
            write_conditions(conditions, w);
            w.push(")");
        }
    }
}

/// Format a value for inlined SQL
pub(crate) fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "NULL".to_string(),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_with_join_and_where() {
        let sql = QueryBuilder::table("posts")
            .add_select(&["*", "users.country_id"])
            .join("users", "users.id", "=", "posts.user_id")
            .where_eq("users.country_id", 2)
            .to_sql();

        assert_eq!(
            sql,
            "SELECT *, users.country_id FROM posts INNER JOIN users ON users.id = posts.user_id WHERE users.country_id = 2"
        );
    }

    #[test]
    fn test_params_are_numbered_in_order() {
        let (sql, params) = QueryBuilder::table("users")
            .where_eq("name", "O'Brien")
            .or_where("age", ">", 30)
            .where_in("id", vec![1, 2])
            .to_sql_with_params();

        assert_eq!(
            sql,
            "SELECT * FROM users WHERE name = $1 OR age > $2 AND id IN ($3, $4)"
        );
        assert_eq!(params, vec![json!("O'Brien"), json!(30), json!(1), json!(2)]);
    }

    #[test]
    fn test_inline_escapes_quotes() {
        let sql = QueryBuilder::table("users").where_eq("name", "O'Brien").to_sql();
        assert_eq!(sql, "SELECT * FROM users WHERE name = 'O''Brien'");
    }

    #[test]
    fn test_empty_in_never_matches() {
        let sql = QueryBuilder::table("posts")
            .where_in::<Value>("user_id", vec![])
            .to_sql();
        assert_eq!(sql, "SELECT * FROM posts WHERE 1 = 0");
    }

    #[test]
    fn test_subquery_params_continue_numbering() {
        let count = QueryBuilder::table("posts")
            .select_raw("COUNT(*)")
            .where_column("posts.user_id", "=", "users.id")
            .where_eq("posts.published", true);

        let (sql, params) = QueryBuilder::table("users")
            .where_eq("users.active", true)
            .where_subquery(count, ">=", 2)
            .to_sql_with_params();

        assert_eq!(
            sql,
            "SELECT * FROM users WHERE users.active = $1 AND (SELECT COUNT(*) FROM posts WHERE posts.user_id = users.id AND posts.published = $2) >= $3"
        );
        assert_eq!(params, vec![json!(true), json!(true), json!(2)]);
    }

    #[test]
    fn test_insert_returning() {
        let (sql, params) = QueryBuilder::new()
            .insert_into("posts")
            .set("title", "Hello")
            .set("user_id", 1)
            .returning("id")
            .to_sql_with_params();

        assert_eq!(
            sql,
            "INSERT INTO posts (title, user_id) VALUES ($1, $2) RETURNING id"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_update_keeps_conditions() {
        let sql = QueryBuilder::table("posts")
            .where_eq("posts.user_id", 1)
            .where_not_null("posts.user_id")
            .update("posts")
            .set("title", "x")
            .to_sql();

        assert_eq!(
            sql,
            "UPDATE posts SET title = 'x' WHERE posts.user_id = 1 AND posts.user_id IS NOT NULL"
        );
    }

    #[test]
    fn test_limit_offset_and_order() {
        let sql = QueryBuilder::table("users")
            .order_by_desc("created_at")
            .paginate(15, 3)
            .to_sql();
        assert_eq!(
            sql,
            "SELECT * FROM users ORDER BY created_at DESC LIMIT 15 OFFSET 30"
        );
    }

    #[test]
    fn test_nested_conditions_are_parenthesised() {
        let sql = QueryBuilder::table("posts")
            .where_eq("posts.user_id", 1)
            .where_nested(|q| q.where_eq("published", true).or_where("featured", "=", true))
            .to_sql();

        assert_eq!(
            sql,
            "SELECT * FROM posts WHERE posts.user_id = 1 AND (published = true OR featured = true)"
        );
    }

    #[test]
    fn test_scoped_groups_only_when_or_is_present() {
        let grouped = QueryBuilder::table("posts")
            .where_in("posts.user_id", vec![1, 2])
            .scoped(|q| q.where_eq("published", true).or_where("featured", "=", true))
            .to_sql();
        assert_eq!(
            grouped,
            "SELECT * FROM posts WHERE posts.user_id IN (1, 2) AND (published = true OR featured = true)"
        );

        let flat = QueryBuilder::table("posts")
            .where_eq("posts.user_id", 1)
            .scoped(|q| q.where_eq("published", true).order_by("id"))
            .to_sql();
        assert_eq!(
            flat,
            "SELECT * FROM posts WHERE posts.user_id = 1 AND published = true ORDER BY id ASC"
        );
    }

    #[test]
    fn test_huge_page_saturates_offset() {
        let sql = QueryBuilder::table("users").paginate(15, i64::MAX).to_sql();
        assert_eq!(
            sql,
            format!("SELECT * FROM users LIMIT 15 OFFSET {}", i64::MAX)
        );
    }
}
