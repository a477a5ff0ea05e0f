// src/services/bundles.rs
use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::models::product::BundleComponent;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StockFigures {
    pub stock: i64,
    pub unit_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    #[error("Bundle '{0}' contains itself through its components")]
    Cycle(String),

    #[error("Component '{component}' of bundle '{bundle}' must have a quantity of at least 1")]
    InvalidQuantity { bundle: String, component: String },
}

/// Derives stock and unit cost for every bundle in `components`.
///
/// Bundles are evaluated after all of their components (Kahn's algorithm), so
/// bundles may contain other bundles. `products` holds the figures of plain
/// products; a component that is missing from it counts as zero stock at zero
/// cost. A bundle with no components has zero stock.
pub fn resolve_bundles(
    products: &HashMap<String, StockFigures>,
    components: &[BundleComponent],
) -> Result<HashMap<String, StockFigures>, BundleError> {
    let mut parts: HashMap<&str, Vec<&BundleComponent>> = HashMap::new();
    for c in components {
        if c.quantity < 1 {
            return Err(BundleError::InvalidQuantity {
                bundle: c.bundle_sku.clone(),
                component: c.component_sku.clone(),
            });
        }
        parts.entry(c.bundle_sku.as_str()).or_default().push(c);
    }

    // Edges run component bundle -> parent bundle.
    let mut pending: HashMap<&str, usize> = HashMap::new();
    let mut parents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (&bundle, list) in &parts {
        let nested = list
            .iter()
            .filter(|c| parts.contains_key(c.component_sku.as_str()))
            .map(|c| c.component_sku.as_str())
            .collect::<HashSet<_>>();
        pending.insert(bundle, nested.len());
        for child in nested {
            parents.entry(child).or_default().push(bundle);
        }
    }

    let mut ready: VecDeque<&str> = {
        let mut roots: Vec<&str> = pending.iter().filter(|(_, n)| **n == 0).map(|(b, _)| *b).collect();
        roots.sort_unstable();
        roots.into()
    };

    let mut resolved: HashMap<String, StockFigures> = HashMap::new();
    while let Some(bundle) = ready.pop_front() {
        let mut stock: Option<i64> = None;
        let mut unit_cost = 0.0;
        for c in parts.get(bundle).into_iter().flatten() {
            let figures = resolved
                .get(&c.component_sku)
                .or_else(|| products.get(&c.component_sku))
                .copied()
                .unwrap_or_default();
            let required = i64::from(c.quantity);
            let available = figures.stock.div_euclid(required);
            stock = Some(stock.map_or(available, |s| s.min(available)));
            unit_cost += figures.unit_cost * f64::from(c.quantity);
        }
        resolved.insert(
            bundle.to_string(),
            StockFigures {
                stock: stock.unwrap_or(0),
                unit_cost,
            },
        );

        for &parent in parents.get(bundle).into_iter().flatten() {
            if let Some(n) = pending.get_mut(parent) {
                *n -= 1;
                if *n == 0 {
                    ready.push_back(parent);
                }
            }
        }
    }

    if resolved.len() < parts.len() {
        let mut stuck: Vec<&str> = parts
            .keys()
            .copied()
            .filter(|b| !resolved.contains_key(*b))
            .collect();
        stuck.sort_unstable();
        return Err(BundleError::Cycle(stuck.first().copied().unwrap_or_default().to_string()));
    }

    Ok(resolved)
}

/// Bundle SKUs whose figures depend on `sku`, directly or through nesting.
pub fn dependent_bundles(sku: &str, components: &[BundleComponent]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::from([sku.to_string()]);
    let mut out = Vec::new();
    while let Some(current) = queue.pop_front() {
        for c in components.iter().filter(|c| c.component_sku == current) {
            if seen.insert(c.bundle_sku.clone()) {
                out.push(c.bundle_sku.clone());
                queue.push_back(c.bundle_sku.clone());
            }
        }
    }
    out
}

/// Units of `sku` consumed by one unit of each bundle that contains it,
/// multiplied through nested bundles.
pub fn unit_requirements(sku: &str, components: &[BundleComponent]) -> HashMap<String, i64> {
    fn units(
        bundle: &str,
        sku: &str,
        components: &[BundleComponent],
        path: &mut Vec<String>,
        memo: &mut HashMap<String, i64>,
    ) -> i64 {
        if let Some(&known) = memo.get(bundle) {
            return known;
        }
        // Cyclic definitions are rejected on write; guard anyway.
        if path.iter().any(|b| b == bundle) {
            return 0;
        }
        path.push(bundle.to_string());
        let mut total = 0;
        for c in components.iter().filter(|c| c.bundle_sku == bundle) {
            let per = if c.component_sku == sku {
                1
            } else {
                units(&c.component_sku, sku, components, path, memo)
            };
            total += i64::from(c.quantity) * per;
        }
        path.pop();
        memo.insert(bundle.to_string(), total);
        total
    }

    let mut memo = HashMap::new();
    dependent_bundles(sku, components)
        .into_iter()
        .map(|bundle| {
            let n = units(&bundle, sku, components, &mut Vec::new(), &mut memo);
            (bundle, n)
        })
        .collect()
}

/// Plain products a bundle is ultimately made of.
pub fn leaf_components(sku: &str, components: &[BundleComponent]) -> Vec<String> {
    let bundles: HashSet<&str> = components.iter().map(|c| c.bundle_sku.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack = vec![sku];
    let mut leaves = Vec::new();
    while let Some(current) = stack.pop() {
        for c in components.iter().filter(|c| c.bundle_sku == current) {
            if !seen.insert(c.component_sku.as_str()) {
                continue;
            }
            if bundles.contains(c.component_sku.as_str()) {
                stack.push(c.component_sku.as_str());
            } else {
                leaves.push(c.component_sku.clone());
            }
        }
    }
    leaves
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(bundle: &str, component: &str, quantity: i32) -> BundleComponent {
        BundleComponent {
            bundle_sku: bundle.to_string(),
            component_sku: component.to_string(),
            quantity,
        }
    }

    fn products(items: &[(&str, i64, f64)]) -> HashMap<String, StockFigures> {
        items
            .iter()
            .map(|(sku, stock, cost)| (sku.to_string(), StockFigures { stock: *stock, unit_cost: *cost }))
            .collect()
    }

    #[test]
    fn bundle_stock_is_limited_by_scarcest_component() {
        let p = products(&[("CUP", 10, 2.0), ("SAUCER", 7, 1.5)]);
        let c = vec![part("SET", "CUP", 2), part("SET", "SAUCER", 2)];
        let out = resolve_bundles(&p, &c).unwrap();
        assert_eq!(out["SET"].stock, 3);
        assert!((out["SET"].unit_cost - 7.0).abs() < 1e-9);
    }

    #[test]
    fn nested_bundles_resolve_components_first() {
        let p = products(&[("CUP", 20, 2.0), ("SAUCER", 20, 1.0), ("BOX", 3, 0.5)]);
        let c = vec![
            part("GIFT", "SET", 2),
            part("GIFT", "BOX", 1),
            part("SET", "CUP", 1),
            part("SET", "SAUCER", 1),
        ];
        let out = resolve_bundles(&p, &c).unwrap();
        assert_eq!(out["SET"].stock, 20);
        assert_eq!(out["GIFT"].stock, 3);
        assert!((out["GIFT"].unit_cost - 6.5).abs() < 1e-9);
    }

    #[test]
    fn oversold_components_floor_towards_negative() {
        let p = products(&[("CUP", -3, 2.0)]);
        let out = resolve_bundles(&p, &[part("PAIR", "CUP", 2)]).unwrap();
        assert_eq!(out["PAIR"].stock, -2);
    }

    #[test]
    fn missing_component_counts_as_empty() {
        let out = resolve_bundles(&HashMap::new(), &[part("SET", "GHOST", 1)]).unwrap();
        assert_eq!(out["SET"], StockFigures::default());
    }

    #[test]
    fn cycles_are_rejected() {
        let c = vec![part("A", "B", 1), part("B", "A", 1)];
        assert_eq!(resolve_bundles(&HashMap::new(), &c), Err(BundleError::Cycle("A".to_string())));
        let self_ref = vec![part("A", "A", 1)];
        assert!(matches!(resolve_bundles(&HashMap::new(), &self_ref), Err(BundleError::Cycle(_))));
    }

    #[test]
    fn zero_quantity_component_is_invalid() {
        let err = resolve_bundles(&HashMap::new(), &[part("SET", "CUP", 0)]).unwrap_err();
        assert!(matches!(err, BundleError::InvalidQuantity { .. }));
        assert_eq!(
            err.to_string(),
            "Component 'CUP' of bundle 'SET' must have a quantity of at least 1"
        );
    }

    #[test]
    fn dependents_include_nested_bundles() {
        let c = vec![part("SET", "CUP", 1), part("GIFT", "SET", 1), part("OTHER", "PLATE", 1)];
        assert_eq!(dependent_bundles("CUP", &c), vec!["SET".to_string(), "GIFT".to_string()]);
        assert!(dependent_bundles("PLATE", &[]).is_empty());
    }

    #[test]
    fn unit_requirements_multiply_through_nesting() {
        let c = vec![part("SET", "CUP", 2), part("GIFT", "SET", 3), part("GIFT", "CUP", 1)];
        let req = unit_requirements("CUP", &c);
        assert_eq!(req["SET"], 2);
        assert_eq!(req["GIFT"], 7);
        assert_eq!(req.len(), 2);
    }

    #[test]
    fn leaf_components_skip_intermediate_bundles() {
        let c = vec![part("SET", "CUP", 2), part("SET", "SAUCER", 1), part("GIFT", "SET", 1), part("GIFT", "BOX", 1)];
        let mut leaves = leaf_components("GIFT", &c);
        leaves.sort();
        assert_eq!(leaves, vec!["BOX", "CUP", "SAUCER"]);
        assert!(leaf_components("CUP", &c).is_empty());
    }
}
