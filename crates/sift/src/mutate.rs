// crates/sift/src/mutate.rs

use crate::ast::FilterComponent;

/// Rewrite a filter tree top-down.
///
/// A node matching `predicate` is replaced by `rewrite(node)` and its result
/// is not visited again. Non-matching groups are rebuilt over their
/// transformed children with the same conjunction; non-matching expressions
/// are kept as they are.
pub fn mutate<P, R>(tree: &FilterComponent, predicate: P, rewrite: R) -> FilterComponent
where
    P: Fn(&FilterComponent) -> bool,
    R: Fn(&FilterComponent) -> FilterComponent,
{
    walk(tree, &predicate, &rewrite)
}

fn walk<P, R>(node: &FilterComponent, predicate: &P, rewrite: &R) -> FilterComponent
where
    P: Fn(&FilterComponent) -> bool,
    R: Fn(&FilterComponent) -> FilterComponent,
{
    if predicate(node) {
        return rewrite(node);
    }
    match node {
        FilterComponent::Expression(_) => node.clone(),
        FilterComponent::Group(g) => FilterComponent::group(
            g.conjunction(),
            g.children()
                .iter()
                .map(|c| walk(c, predicate, rewrite))
                .collect(),
        ),
    }
}

/// Conjoin a mandatory filter onto an optional caller-supplied tree.
pub fn restrict(tree: Option<&FilterComponent>, mandatory: FilterComponent) -> FilterComponent {
    match tree {
        Some(tree) => FilterComponent::and(vec![tree.clone(), mandatory]),
        None => mandatory,
    }
}
