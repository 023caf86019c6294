//! Table and column reference checks.
//!
//! Walks the query one SELECT at a time. Each SELECT gets a scope holding the
//! sources in its FROM clause; column references resolve against that scope
//! and then outward through enclosing scopes, which covers correlated
//! subqueries. CTEs and derived tables are opaque sources: their columns are
//! not checked against the catalog.

use sqlparser::ast::{
    Expr, Ident, ObjectName, Query, Select, SelectItem, SetExpr, TableFactor, TableWithJoins,
    Visit, Visitor,
};
use std::collections::HashSet;
use std::ops::ControlFlow;

use crate::catalog::{AllowList, CatalogSnapshot};
use crate::error::{Result, TripSqlError};

fn lower(ident: &Ident) -> String {
    ident.value.to_lowercase()
}

fn display_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|i| i.value.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

/// Splits a table name into an optional schema and the table. A leading
/// catalog part (`hive.nyc_taxi.t`) must already have been checked by
/// [`check_allow_list`].
fn split_table_name(name: &ObjectName) -> (Option<String>, String) {
    let parts = &name.0;
    match parts.len() {
        0 => (None, String::new()),
        1 => (None, lower(&parts[0])),
        n => (Some(lower(&parts[n - 2])), lower(&parts[n - 1])),
    }
}

/// Collects every table name and CTE name in a statement.
#[derive(Default)]
struct RelationCollector {
    relations: Vec<ObjectName>,
    cte_names: HashSet<String>,
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        if let Some(with) = &query.with {
            self.cte_names
                .extend(with.cte_tables.iter().map(|cte| lower(&cte.alias.name)));
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<()> {
        self.relations.push(relation.clone());
        ControlFlow::Continue(())
    }
}

/// Rejects any table outside the allow-list, anywhere in the query.
///
/// Runs before column resolution so a forbidden table is reported as
/// `ForbiddenTable` even when it is also unknown to the snapshot.
pub fn check_allow_list(query: &Query, allow_list: &AllowList) -> Result<()> {
    let mut collector = RelationCollector::default();
    let _ = query.visit(&mut collector);

    for relation in &collector.relations {
        let parts = &relation.0;
        if parts.len() == 1 && collector.cte_names.contains(&lower(&parts[0])) {
            continue;
        }
        let foreign_catalog = match parts.len() {
            0..=2 => false,
            3 => !allow_list.permits_catalog(&parts[0].value),
            _ => true,
        };
        if foreign_catalog {
            return Err(TripSqlError::forbidden_table(format!(
                "Table '{}' is outside the engine catalog",
                display_name(relation)
            )));
        }
        let (schema, table) = split_table_name(relation);
        if !allow_list.permits(schema.as_deref(), &table) {
            return Err(TripSqlError::forbidden_table(format!(
                "Table '{}' is not in the allow-list ({})",
                display_name(relation),
                allow_list
            )));
        }
    }
    Ok(())
}

/// Column refs and subqueries directly inside an expression tree. Refs
/// inside nested subqueries belong to those subqueries' scopes.
#[derive(Default)]
struct ExprRefs {
    columns: Vec<Vec<Ident>>,
    subqueries: Vec<Query>,
    depth: usize,
}

impl Visitor for ExprRefs {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        if self.depth == 0 {
            self.subqueries.push(query.clone());
        }
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<()> {
        self.depth = self.depth.saturating_sub(1);
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<()> {
        if self.depth == 0 {
            match expr {
                Expr::Identifier(ident) => self.columns.push(vec![ident.clone()]),
                Expr::CompoundIdentifier(parts) => self.columns.push(parts.clone()),
                _ => {}
            }
        }
        ControlFlow::Continue(())
    }
}

#[derive(Debug)]
enum Columns {
    Known(Vec<String>),
    Opaque,
}

#[derive(Debug)]
struct Source {
    /// Alias, or the bare table name when there is none.
    name: String,
    /// Schema and table for catalog tables referenced without an alias.
    qualified: Option<(String, String)>,
    columns: Columns,
}

impl Source {
    fn has_column(&self, column: &str) -> bool {
        match &self.columns {
            Columns::Known(cols) => cols.iter().any(|c| c == column),
            Columns::Opaque => false,
        }
    }
}

#[derive(Default)]
struct Scope<'p> {
    parent: Option<&'p Scope<'p>>,
    ctes: Vec<String>,
    sources: Vec<Source>,
    aliases: Vec<String>,
}

impl<'p> Scope<'p> {
    fn child(parent: Option<&'p Scope<'p>>) -> Self {
        Self {
            parent,
            ..Self::default()
        }
    }

    fn ancestors(&self) -> impl Iterator<Item = &Scope<'p>> + '_ {
        std::iter::successors(Some(self), |s| s.parent)
    }

    fn is_cte(&self, name: &str) -> bool {
        self.ancestors().any(|s| s.ctes.iter().any(|c| c == name))
    }
}

/// Resolves references against a catalog snapshot.
pub struct Resolver<'a> {
    snapshot: &'a CatalogSnapshot,
    default_schema: &'a str,
}

impl<'a> Resolver<'a> {
    pub fn new(snapshot: &'a CatalogSnapshot, default_schema: &'a str) -> Self {
        Self {
            snapshot,
            default_schema,
        }
    }

    /// Checks every table and column reference in `query`. Returns the
    /// top-level output names (projection aliases and plain column names).
    pub fn check_query(&self, query: &Query) -> Result<Vec<String>> {
        self.walk_query(query, None)
    }

    fn walk_query(&self, query: &Query, parent: Option<&Scope<'_>>) -> Result<Vec<String>> {
        let mut with_scope = Scope::child(parent);
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.walk_query(&cte.query, Some(&with_scope))?;
                with_scope.ctes.push(lower(&cte.alias.name));
            }
        }

        match query.body.as_ref() {
            SetExpr::Select(select) => self.walk_select(select, Some(&with_scope), Some(query)),
            body => {
                let names = self.walk_set_expr(body, &with_scope)?;
                self.check_set_order_by(query, body, &names, &with_scope)?;
                Ok(names)
            }
        }
    }

    /// ORDER BY on a set operation or parenthesized query sees only the
    /// output columns of the leftmost branch. When those names cannot all be
    /// derived (wildcards, unnamed expressions) the columns are opaque, but
    /// subqueries are still checked.
    fn check_set_order_by(
        &self,
        query: &Query,
        body: &SetExpr,
        names: &[String],
        parent: &Scope<'_>,
    ) -> Result<()> {
        if query.order_by.is_none() {
            return Ok(());
        }
        let mut scope = Scope::child(Some(parent));
        if has_named_outputs(body) {
            scope.aliases = names.iter().map(|n| n.to_lowercase()).collect();
        } else {
            scope.sources.push(Source {
                name: String::new(),
                qualified: None,
                columns: Columns::Opaque,
            });
        }
        self.check_refs(collect(&query.order_by), &scope)
    }

    fn walk_set_expr(&self, body: &SetExpr, scope: &Scope<'_>) -> Result<Vec<String>> {
        match body {
            SetExpr::Select(select) => self.walk_select(select, Some(scope), None),
            SetExpr::Query(query) => self.walk_query(query, Some(scope)),
            SetExpr::SetOperation { left, right, .. } => {
                let names = self.walk_set_expr(left, scope)?;
                self.walk_set_expr(right, scope)?;
                Ok(names)
            }
            other => {
                let refs = collect(other);
                for sub in &refs.subqueries {
                    self.walk_query(sub, Some(scope))?;
                }
                Ok(Vec::new())
            }
        }
    }

    /// `outer` is the query owning this SELECT, whose ORDER BY resolves in
    /// the SELECT's scope.
    fn walk_select(
        &self,
        select: &Select,
        parent: Option<&Scope<'_>>,
        outer: Option<&Query>,
    ) -> Result<Vec<String>> {
        if select.into.is_some() {
            return Err(TripSqlError::unsafe_statement(
                "SELECT INTO creates a table and is not allowed",
            ));
        }

        let mut scope = Scope::child(parent);
        for table in &select.from {
            self.add_table_with_joins(table, &mut scope, parent)?;
        }

        let mut output_names = Vec::new();
        for item in &select.projection {
            match item {
                SelectItem::ExprWithAlias { alias, .. } => {
                    scope.aliases.push(lower(alias));
                    output_names.push(alias.value.clone());
                }
                SelectItem::UnnamedExpr(Expr::Identifier(ident)) => {
                    output_names.push(ident.value.clone());
                }
                SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)) => {
                    if let Some(last) = parts.last() {
                        output_names.push(last.value.clone());
                    }
                }
                SelectItem::QualifiedWildcard(name, _) => {
                    self.check_qualifier(name, &scope)?;
                }
                _ => {}
            }
        }

        self.check_refs(collect(&select.projection), &scope)?;
        for table in &select.from {
            for join in &table.joins {
                self.check_refs(collect(&join.join_operator), &scope)?;
            }
        }
        self.check_refs(collect(&select.selection), &scope)?;
        self.check_refs(collect(&select.group_by), &scope)?;
        self.check_refs(collect(&select.having), &scope)?;
        self.check_refs(collect(&select.qualify), &scope)?;
        if let Some(query) = outer {
            self.check_refs(collect(&query.order_by), &scope)?;
        }

        Ok(output_names)
    }

    fn add_table_with_joins(
        &self,
        table: &TableWithJoins,
        scope: &mut Scope<'_>,
        outer: Option<&Scope<'_>>,
    ) -> Result<()> {
        self.add_factor(&table.relation, scope, outer)?;
        for join in &table.joins {
            self.add_factor(&join.relation, scope, outer)?;
        }
        Ok(())
    }

    fn add_factor(
        &self,
        factor: &TableFactor,
        scope: &mut Scope<'_>,
        outer: Option<&Scope<'_>>,
    ) -> Result<()> {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let alias_name = alias.as_ref().map(|a| lower(&a.name));
                let (schema, table) = split_table_name(name);

                if schema.is_none() && scope.is_cte(&table) {
                    scope.sources.push(Source {
                        name: alias_name.unwrap_or(table),
                        qualified: None,
                        columns: Columns::Opaque,
                    });
                    return Ok(());
                }

                let descriptor = self
                    .snapshot
                    .find_table(schema.as_deref(), &table, self.default_schema)
                    .ok_or_else(|| {
                        TripSqlError::unknown_reference(format!(
                            "Table '{}' does not exist in catalog version {}",
                            display_name(name),
                            self.snapshot.version
                        ))
                    })?;

                scope.sources.push(Source {
                    qualified: alias_name.is_none().then(|| {
                        (
                            descriptor.schema.to_lowercase(),
                            descriptor.name.to_lowercase(),
                        )
                    }),
                    name: alias_name.unwrap_or(table),
                    columns: Columns::Known(
                        descriptor
                            .columns
                            .iter()
                            .map(|c| c.name.to_lowercase())
                            .collect(),
                    ),
                });
                Ok(())
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                self.walk_query(subquery, outer)?;
                if let Some(alias) = alias {
                    scope.sources.push(Source {
                        name: lower(&alias.name),
                        qualified: None,
                        columns: Columns::Opaque,
                    });
                }
                Ok(())
            }
            TableFactor::NestedJoin {
                table_with_joins,
                alias,
                ..
            } => {
                self.add_table_with_joins(table_with_joins, scope, outer)?;
                if let Some(alias) = alias {
                    scope.sources.push(Source {
                        name: lower(&alias.name),
                        qualified: None,
                        columns: Columns::Opaque,
                    });
                }
                Ok(())
            }
            TableFactor::UNNEST { alias, .. } => {
                self.check_refs(collect(factor), scope)?;
                if let Some(alias) = alias {
                    scope.sources.push(Source {
                        name: lower(&alias.name),
                        qualified: None,
                        columns: Columns::Opaque,
                    });
                }
                Ok(())
            }
            other => Err(TripSqlError::unsafe_statement(format!(
                "Unsupported table source: {}",
                other
            ))),
        }
    }

    fn check_refs(&self, refs: ExprRefs, scope: &Scope<'_>) -> Result<()> {
        for parts in &refs.columns {
            self.resolve_column(parts, scope)?;
        }
        for sub in &refs.subqueries {
            self.walk_query(sub, Some(scope))?;
        }
        Ok(())
    }

    fn check_qualifier(&self, name: &ObjectName, scope: &Scope<'_>) -> Result<()> {
        let qualifier: Vec<String> = name.0.iter().map(lower).collect();
        if scope.ancestors().any(|s| find_source(s, &qualifier).is_some()) {
            Ok(())
        } else {
            Err(TripSqlError::unknown_reference(format!(
                "Unknown table or alias '{}'",
                display_name(name)
            )))
        }
    }

    fn resolve_column(&self, parts: &[Ident], scope: &Scope<'_>) -> Result<()> {
        let Some((column, qualifier)) = parts.split_last() else {
            return Ok(());
        };
        let column_name = lower(column);

        if qualifier.is_empty() {
            return self.resolve_unqualified(&column.value, &column_name, scope);
        }

        let qualifier: Vec<String> = qualifier.iter().map(lower).collect();
        for s in scope.ancestors() {
            if let Some(source) = find_source(s, &qualifier) {
                return match &source.columns {
                    Columns::Opaque => Ok(()),
                    Columns::Known(_) if source.has_column(&column_name) => Ok(()),
                    Columns::Known(_) => Err(TripSqlError::unknown_reference(format!(
                        "Column '{}' does not exist in '{}'",
                        column.value,
                        qualifier.join(".")
                    ))),
                };
            }
        }

        Err(TripSqlError::unknown_reference(format!(
            "Unknown table or alias '{}' in reference '{}'",
            qualifier.join("."),
            parts.iter().map(|p| p.value.as_str()).collect::<Vec<_>>().join(".")
        )))
    }

    fn resolve_unqualified(&self, display: &str, column: &str, scope: &Scope<'_>) -> Result<()> {
        for s in scope.ancestors() {
            let providers: Vec<&Source> =
                s.sources.iter().filter(|src| src.has_column(column)).collect();
            match providers.len() {
                0 => {}
                1 => return Ok(()),
                _ => {
                    let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
                    return Err(TripSqlError::ambiguous_reference(format!(
                        "Column '{}' is provided by more than one table: {}",
                        display,
                        names.join(", ")
                    )));
                }
            }
            if s.aliases.iter().any(|a| a == column) {
                return Ok(());
            }
            if s
                .sources
                .iter()
                .any(|src| matches!(src.columns, Columns::Opaque))
            {
                return Ok(());
            }
        }

        Err(TripSqlError::unknown_reference(format!(
            "Column '{}' does not exist in any referenced table",
            display
        )))
    }
}

fn leftmost_select(body: &SetExpr) -> Option<&Select> {
    match body {
        SetExpr::Select(select) => Some(select),
        SetExpr::Query(query) => leftmost_select(&query.body),
        SetExpr::SetOperation { left, .. } => leftmost_select(left),
        _ => None,
    }
}

/// True if every output column of `body` has a name the resolver knows.
fn has_named_outputs(body: &SetExpr) -> bool {
    leftmost_select(body).is_some_and(|select| {
        select.projection.iter().all(|item| {
            matches!(
                item,
                SelectItem::ExprWithAlias { .. }
                    | SelectItem::UnnamedExpr(Expr::Identifier(_))
                    | SelectItem::UnnamedExpr(Expr::CompoundIdentifier(_))
            )
        })
    })
}

fn find_source<'s>(scope: &'s Scope<'_>, qualifier: &[String]) -> Option<&'s Source> {
    match qualifier {
        [name] => scope.sources.iter().find(|s| &s.name == name),
        [.., schema, table] => scope.sources.iter().find(|s| {
            s.qualified
                .as_ref()
                .is_some_and(|(qs, qt)| qs == schema && qt == table)
        }),
        [] => None,
    }
}

fn collect<T: Visit>(node: &T) -> ExprRefs {
    let mut refs = ExprRefs::default();
    let _ = node.visit(&mut refs);
    refs
}
