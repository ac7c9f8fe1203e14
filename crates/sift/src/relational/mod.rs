// crates/sift/src/relational/mod.rs
//! Filter/sort/page → SeaQuery condition, joins and ordering.
//!
//! Dropped sub-filters (unsupported operators, unresolvable paths) never
//! fail compilation: they compile to "no restriction", which widens an
//! enclosing OR and is skipped inside an AND.

mod path;
mod value;

pub use path::Join;
pub use value::{DefaultValueParser, ValueParser};

#[cfg(test)]
pub use value::MockValueParser;

use crate::ast::{Conjunction, FilterComponent, FilterExpression, Operator, QueryComponent};
use crate::page::Page;
use crate::parser::NULL_LITERAL;
use crate::registry::MappingRegistry;
use crate::schema::{AttrType, Metamodel};
use crate::settings::Settings;
use crate::{Error, Result};
use path::{JoinSet, PathResolver, Target};
use sea_query::{
    Alias, Asterisk, Cond, Condition, Expr, Func, JoinType, LikeExpr, NullOrdering, Order, Query,
    SelectStatement, SimpleExpr,
};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// `None` means the (sub-)filter places no restriction.
type Restriction = Option<Condition>;

/// Compiled query, independent of any SQL backend.
#[derive(Debug, Clone)]
pub struct RelationalQuery {
    table: String,
    id_column: String,
    condition: Restriction,
    joins: Vec<Join>,
    sort_joins: Vec<Join>,
    orders: Vec<(SimpleExpr, Order)>,
    includes: BTreeSet<String>,
    page: Page,
}

impl RelationalQuery {
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Joins the filter needs.
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Joins the ordering needs; never through a to-many relation.
    pub fn sort_joins(&self) -> &[Join] {
        &self.sort_joins
    }

    pub fn orders(&self) -> &[(SimpleExpr, Order)] {
        &self.orders
    }

    /// Verified include paths for eager fetching.
    pub fn includes(&self) -> &BTreeSet<String> {
        &self.includes
    }

    pub fn page(&self) -> Page {
        self.page
    }

    /// A to-many filter join can repeat root rows, so the filter moves into
    /// `<root>.<id> IN (SELECT ...)`.
    pub fn needs_subquery(&self) -> bool {
        self.joins.iter().any(|j| j.collection)
    }

    /// `SELECT <root>.* FROM <root> ...` with everything applied.
    pub fn to_select(&self) -> SelectStatement {
        let mut select = Query::select();
        select
            .column((Alias::new(self.table.as_str()), Asterisk))
            .from(Alias::new(self.table.as_str()));
        self.apply(&mut select);
        select
    }

    /// Apply joins, condition, ordering and paging to a caller-built select
    /// over the root table.
    pub fn apply(&self, select: &mut SelectStatement) {
        if self.needs_subquery() {
            let root = Alias::new(self.table.as_str());
            let id = Alias::new(self.id_column.as_str());

            let mut matching = Query::select();
            matching.column((root.clone(), id.clone())).from(root.clone());
            left_join(&mut matching, &self.joins);
            if let Some(condition) = &self.condition {
                matching.cond_where(condition.clone());
            }
            select.and_where(Expr::col((root, id)).in_subquery(matching));
            left_join(select, &self.sort_joins);
        } else {
            let mut joins = JoinSet::default();
            for join in self.joins.iter().chain(&self.sort_joins) {
                joins.add(join.clone());
            }
            left_join(select, &joins.into_vec());
            if let Some(condition) = &self.condition {
                select.cond_where(condition.clone());
            }
        }
        for (expr, order) in &self.orders {
            select.order_by_expr_with_nulls(expr.clone(), order.clone(), NullOrdering::Last);
        }
        select.limit(self.page.limit).offset(self.page.offset);
    }
}

fn left_join(select: &mut SelectStatement, joins: &[Join]) {
    for join in joins {
        select.join_as(
            JoinType::LeftJoin,
            Alias::new(join.table.as_str()),
            Alias::new(join.alias.as_str()),
            Expr::col((Alias::new(join.parent.as_str()), Alias::new(join.local.as_str())))
                .equals((Alias::new(join.alias.as_str()), Alias::new(join.foreign.as_str()))),
        );
    }
}

pub struct RelationalCompiler<'a> {
    schema: &'a dyn Metamodel,
    registry: &'a MappingRegistry,
    values: &'a dyn ValueParser,
    settings: Settings,
    case_sensitive: bool,
}

impl<'a> RelationalCompiler<'a> {
    pub fn new(
        schema: &'a dyn Metamodel,
        registry: &'a MappingRegistry,
        values: &'a dyn ValueParser,
        settings: Settings,
    ) -> Self {
        Self {
            schema,
            registry,
            values,
            case_sensitive: settings.sort.case_sensitive,
            settings,
        }
    }

    /// Override the sort case-sensitivity from the settings.
    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    pub fn compile(&self, query: &QueryComponent) -> Result<RelationalQuery> {
        let resolver = PathResolver::new(self.schema, self.registry)?;
        let root = resolver.root();
        let id = root.id_attribute().ok_or_else(|| {
            Error::schema(format!("identifier `{}` of `{}` is not an attribute", root.id, root.name))
        })?;

        let mut joins = JoinSet::default();
        let condition = match query.filters() {
            Some(filters) => self.compile_component(&resolver, filters, &mut joins)?,
            None => None,
        };

        let mut sort_joins = JoinSet::default();
        let orders = query
            .sorts()
            .iter()
            .map(|key| self.compile_sort(&resolver, key, &mut sort_joins))
            .collect::<Result<Vec<_>>>()?;

        Ok(RelationalQuery {
            table: root.table.clone(),
            id_column: id.column().to_string(),
            condition,
            joins: joins.into_vec(),
            sort_joins: sort_joins.into_vec(),
            orders,
            includes: self
                .registry
                .extract_relationships(query.includes(), self.registry.root()),
            page: Page::resolve(query.page_offset(), query.page_limit(), &self.settings.paging),
        })
    }

    fn compile_component(
        &self,
        resolver: &PathResolver<'_>,
        node: &FilterComponent,
        joins: &mut JoinSet,
    ) -> Result<Restriction> {
        let group = match node {
            FilterComponent::Expression(e) => return self.compile_expression(resolver, e, joins),
            FilterComponent::Group(g) => g,
        };

        match group.conjunction() {
            Conjunction::And => {
                let mut cond = Cond::all();
                let mut restricted = false;
                for child in group.children() {
                    if let Some(c) = self.compile_component(resolver, child, joins)? {
                        cond = cond.add(c);
                        restricted = true;
                    }
                }
                Ok(restricted.then_some(cond))
            }
            Conjunction::Or => {
                if group.children().is_empty() {
                    return Ok(Some(Cond::all().add(Expr::cust("FALSE"))));
                }
                let mut local = joins.clone();
                let mut cond = Cond::any();
                let mut widened = false;
                for child in group.children() {
                    match self.compile_component(resolver, child, &mut local)? {
                        Some(c) => cond = cond.add(c),
                        None => widened = true,
                    }
                }
                if widened {
                    return Ok(None);
                }
                *joins = local;
                Ok(Some(cond))
            }
        }
    }

    fn compile_expression(
        &self,
        resolver: &PathResolver<'_>,
        e: &FilterExpression,
        joins: &mut JoinSet,
    ) -> Result<Restriction> {
        let value = e.value().filter(|v| *v != NULL_LITERAL);
        let op = e.operator();

        let supported = match value {
            None => matches!(op, Operator::Eq | Operator::Like | Operator::Neq),
            Some(_) => matches!(
                op,
                Operator::Eq | Operator::Neq | Operator::Like | Operator::Ilike
            ),
        };
        if !supported {
            warn!(
                attribute = e.attribute(),
                operator = %op,
                null = value.is_none(),
                "dropping filter with unsupported operator"
            );
            return Ok(None);
        }

        let Some(target) = resolver.resolve(e.attribute(), joins)? else {
            debug!(
                class = %resolver.root().name,
                attribute = e.attribute(),
                "filter attribute does not resolve, no restriction"
            );
            return Ok(None);
        };
        let Target { expr, ty } = target;

        let simple = match (value, op) {
            (None, Operator::Neq) => Expr::expr(expr).is_not_null(),
            (None, _) => Expr::expr(expr).is_null(),
            (Some(raw), Operator::Like) => textual(expr, ty).like(like_pattern(raw)),
            (Some(raw), Operator::Ilike) => Expr::expr(Func::lower(textual_expr(expr, ty)))
                .like(like_pattern(&raw.to_lowercase())),
            (Some(raw), _) => match self.values.parse(raw, ty) {
                Ok(v) if *op == Operator::Neq => Expr::expr(expr).ne(v),
                Ok(v) => Expr::expr(expr).eq(v),
                Err(err) => {
                    warn!(
                        attribute = e.attribute(),
                        value = raw,
                        error = %err,
                        "filter value does not coerce"
                    );
                    if *op == Operator::Neq {
                        Expr::expr(expr).is_not_null()
                    } else {
                        Expr::cust("FALSE")
                    }
                }
            },
        };
        Ok(Some(Cond::all().add(simple)))
    }

    fn compile_sort(
        &self,
        resolver: &PathResolver<'_>,
        key: &str,
        joins: &mut JoinSet,
    ) -> Result<(SimpleExpr, Order)> {
        let (path, order) = match key.strip_prefix('-') {
            Some(rest) => (rest, Order::Desc),
            None => (key, Order::Asc),
        };
        let mut pending = JoinSet::default();
        let Target { expr, ty } = resolver
            .resolve(path, &mut pending)?
            .ok_or_else(|| Error::unknown_attribute(resolver.root().name.clone(), path))?;
        if pending.crosses_collection() {
            return Err(Error::unsortable(resolver.root().name.clone(), path));
        }
        joins.extend(pending);

        let expr = if !self.case_sensitive && ty.is_textual() {
            Func::lower(expr).into()
        } else {
            expr
        };
        Ok((expr, order))
    }
}

/// `\` escapes the next character; a dangling trailing `\` matches itself.
fn like_pattern(raw: &str) -> LikeExpr {
    let trailing = raw.len() - raw.trim_end_matches('\\').len();
    let pattern = if trailing % 2 == 1 {
        format!("{raw}\\")
    } else {
        raw.to_string()
    };
    LikeExpr::new(pattern).escape('\\')
}

/// LIKE needs a text operand; cast other column types.
fn textual_expr(expr: SimpleExpr, ty: AttrType) -> SimpleExpr {
    if ty.is_textual() {
        expr
    } else {
        Expr::expr(expr).cast_as(Alias::new("TEXT"))
    }
}

fn textual(expr: SimpleExpr, ty: AttrType) -> Expr {
    Expr::expr(textual_expr(expr, ty))
}
