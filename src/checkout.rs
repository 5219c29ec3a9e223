//! Checkout aggregator: turns resolved lines into a [`CheckoutResult`].
//!
//! Lines with a product reference become one [`MappedItem`] each and are
//! combined into a single cart-add link. Lines without one are grouped by
//! normalized name into manual-search entries. Within a group, amounts
//! that convert to the first line's unit are summed into it; the rest are
//! summed separately into `additional_amounts`, never added to the total.
//!
//! The aggregator does no I/O and is deterministic: the same input always
//! produces byte-identical output.

use std::collections::HashMap;

use crate::affiliate::LinkBuilder;
use crate::models::{
    normalize_name, Amount, CheckoutResult, DeliveryService, MappedItem, Quantity, ResolvedLine,
    UnmappedItem,
};
use crate::units;

#[derive(Debug, Clone)]
pub struct CheckoutAggregator {
    links: LinkBuilder,
}

impl CheckoutAggregator {
    pub fn new(links: LinkBuilder) -> Self {
        Self { links }
    }

    pub fn links(&self) -> &LinkBuilder {
        &self.links
    }

    pub fn build_checkout(&self, lines: &[ResolvedLine], service: DeliveryService) -> CheckoutResult {
        let mut mapped_items = Vec::new();
        let mut unmapped = Vec::new();
        for line in lines {
            match &line.product_ref {
                Some(product_ref) => mapped_items.push(MappedItem {
                    name: line.name.clone(),
                    product_ref: product_ref.clone(),
                    quantity: line.quantity.clone(),
                    unit: non_empty(&line.unit),
                }),
                None => unmapped.push(line),
            }
        }

        let department = self
            .links
            .marketplace()
            .departments
            .get(&service)
            .map(String::as_str);

        let unmapped_items: Vec<UnmappedItem> = group_by_name(&unmapped)
            .into_iter()
            .map(|group| {
                let ingredient = group[0].name.trim().to_string();
                let merged = merge_amounts(&group);
                UnmappedItem {
                    search_url: self.links.search_url(&ingredient, department),
                    ingredient,
                    quantity: merged.quantity,
                    unit: merged.unit,
                    additional_amounts: merged.additional,
                }
            })
            .collect();

        let cart_url = if mapped_items.is_empty() {
            None
        } else {
            Some(self.links.cart_url(&mapped_items))
        };

        CheckoutResult {
            has_cart_items: !mapped_items.is_empty(),
            has_unmapped_items: !unmapped_items.is_empty(),
            mapped_items,
            unmapped_items,
            cart_url,
        }
    }
}

fn non_empty(unit: &str) -> Option<String> {
    let unit = unit.trim();
    (!unit.is_empty()).then(|| unit.to_string())
}

/// Group lines by normalized name, groups in order of first appearance.
fn group_by_name<'a>(lines: &[&'a ResolvedLine]) -> Vec<Vec<&'a ResolvedLine>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<&ResolvedLine>> = Vec::new();
    for &line in lines {
        let key = normalize_name(&line.name);
        match index.get(&key) {
            Some(&i) => groups[i].push(line),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![line]);
            }
        }
    }
    groups
}

struct Merged {
    quantity: Option<Quantity>,
    unit: Option<String>,
    additional: Vec<Amount>,
}

fn merge_amounts(group: &[&ResolvedLine]) -> Merged {
    let first = group[0];
    let unit = non_empty(&first.unit);
    if group.len() == 1 {
        return Merged {
            quantity: Some(first.quantity.clone()),
            unit,
            additional: Vec::new(),
        };
    }

    let base_unit = first.unit.as_str();
    let mut total: Option<f64> = None;
    // Amounts that do not convert to the base unit, merged among themselves
    let mut others: Vec<Amount> = Vec::new();

    for line in group {
        // Non-numeric amounts ("a pinch") contribute nothing
        let Some(value) = line.quantity.as_number() else {
            continue;
        };
        if let Some(converted) = units::convert(value, &line.unit, base_unit) {
            *total.get_or_insert(0.0) += converted;
            continue;
        }
        let existing = others.iter_mut().find_map(|amount| {
            units::convert(value, &line.unit, &amount.unit).map(|c| (amount, c))
        });
        match existing {
            Some((amount, converted)) => amount.quantity += converted,
            None => others.push(Amount {
                quantity: value,
                unit: line.unit.trim().to_string(),
            }),
        }
    }

    let quantity = match total {
        Some(sum) => Quantity::Number(units::round_amount(sum)),
        None => first.quantity.clone(),
    };
    let additional = others
        .into_iter()
        .map(|amount| Amount {
            quantity: units::round_amount(amount.quantity),
            unit: amount.unit,
        })
        .collect();

    Merged {
        quantity: Some(quantity),
        unit,
        additional,
    }
}
