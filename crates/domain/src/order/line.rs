//! Order lines and the insertion-ordered line collection.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    BundleComponent, DiscountKind, EmployeeId, LineId, LineStatus, MenuItemId, Modifier, Money,
};

/// Caller-supplied description of a line to add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemSpec {
    pub menu_item_id: MenuItemId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    /// Tax rate as a percentage (e.g. 10.0 = 10%).
    pub tax_rate: f64,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub bundle_components: Vec<BundleComponent>,
    #[serde(default)]
    pub note: Option<String>,
}

impl LineItemSpec {
    pub fn new(
        menu_item_id: impl Into<MenuItemId>,
        name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
        tax_rate: f64,
    ) -> Self {
        Self {
            menu_item_id: menu_item_id.into(),
            name: name.into(),
            quantity,
            unit_price,
            tax_rate,
            modifiers: Vec::new(),
            bundle_components: Vec::new(),
            note: None,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Vec<Modifier>) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_bundle_components(mut self, components: Vec<BundleComponent>) -> Self {
        self.bundle_components = components;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Kitchen hold state on a pending line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldInfo {
    pub held_by: EmployeeId,
    pub reason: String,
    pub held_at: DateTime<Utc>,
}

/// A discount applied to a single line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDiscount {
    pub kind: DiscountKind,
    pub reason: String,
    pub approved_by: Option<EmployeeId>,
}

/// A manual price override, preserving the original price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceOverride {
    pub original_price: Money,
    pub reason: String,
    pub approved_by: Option<EmployeeId>,
}

/// Void metadata on a voided line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidInfo {
    pub voided_by: EmployeeId,
    pub reason: String,
    pub voided_at: DateTime<Utc>,
}

/// A single line on an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: LineId,
    pub menu_item_id: MenuItemId,
    pub name: String,
    pub quantity: u32,
    /// Current unit price; the pre-override price lives in `price_override`.
    pub unit_price: Money,
    /// Tax rate as a percentage.
    pub tax_rate: f64,
    pub modifiers: Vec<Modifier>,
    pub bundle_components: Vec<BundleComponent>,
    pub note: Option<String>,
    pub status: LineStatus,
    #[serde(default)]
    pub hold: Option<HoldInfo>,
    #[serde(default)]
    pub course: Option<u32>,
    #[serde(default)]
    pub seat: Option<u32>,
    #[serde(default)]
    pub discount: Option<LineDiscount>,
    #[serde(default)]
    pub price_override: Option<PriceOverride>,
    #[serde(default)]
    pub void_info: Option<VoidInfo>,
}

impl OrderLine {
    /// Builds a fresh pending line from a spec.
    pub fn from_spec(id: LineId, spec: LineItemSpec) -> Self {
        Self {
            id,
            menu_item_id: spec.menu_item_id,
            name: spec.name,
            quantity: spec.quantity,
            unit_price: spec.unit_price,
            tax_rate: spec.tax_rate,
            modifiers: spec.modifiers,
            bundle_components: spec.bundle_components,
            note: spec.note,
            status: LineStatus::Pending,
            hold: None,
            course: None,
            seat: None,
            discount: None,
            price_override: None,
            void_info: None,
        }
    }

    /// Gross total before any line discount:
    /// `unit*qty + sum(modifier totals) + sum(bundle adjustments)`.
    pub fn gross_total(&self) -> Money {
        let modifiers: Money = self.modifiers.iter().map(Modifier::total).sum();
        let bundles: Money = self.bundle_components.iter().map(BundleComponent::total).sum();
        self.unit_price.multiply(self.quantity) + modifiers + bundles
    }

    /// Amount removed by the line discount, capped at the gross total.
    pub fn discount_amount(&self) -> Money {
        match &self.discount {
            Some(discount) => discount.kind.amount_against(self.gross_total()),
            None => Money::zero(),
        }
    }

    /// Line total net of the line discount.
    pub fn line_total(&self) -> Money {
        self.gross_total() - self.discount_amount()
    }

    /// Tax on the net line total, rounded to the cent.
    pub fn tax_amount(&self) -> Money {
        self.line_total().percent(self.tax_rate)
    }

    /// Returns true if the line counts toward totals.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Returns true if the line is pending, not voided, and not held.
    pub fn can_fire(&self) -> bool {
        self.status.can_fire() && self.hold.is_none()
    }

    /// Returns true if the line is eligible for hold/release.
    pub fn can_hold(&self) -> bool {
        self.status.can_fire()
    }
}

/// Insertion-ordered collection of lines with O(1) lookup by id.
///
/// Serializes as a plain ordered list; the index is rebuilt on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<OrderLine>", into = "Vec<OrderLine>")]
pub struct LineMap {
    lines: Vec<OrderLine>,
    index: HashMap<LineId, usize>,
}

impl LineMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line, or replaces it in place if the id already exists.
    pub fn insert(&mut self, line: OrderLine) {
        match self.index.get(&line.id) {
            Some(&pos) => self.lines[pos] = line,
            None => {
                self.index.insert(line.id, self.lines.len());
                self.lines.push(line);
            }
        }
    }

    pub fn get(&self, id: &LineId) -> Option<&OrderLine> {
        self.index.get(id).map(|&pos| &self.lines[pos])
    }

    pub fn get_mut(&mut self, id: &LineId) -> Option<&mut OrderLine> {
        self.index.get(id).map(|&pos| &mut self.lines[pos])
    }

    pub fn contains(&self, id: &LineId) -> bool {
        self.index.contains_key(id)
    }

    /// Removes a line, preserving the order of the rest.
    pub fn remove(&mut self, id: &LineId) -> Option<OrderLine> {
        let pos = self.index.remove(id)?;
        let line = self.lines.remove(pos);
        for shifted in &self.lines[pos..] {
            if let Some(entry) = self.index.get_mut(&shifted.id) {
                *entry -= 1;
            }
        }
        Some(line)
    }

    /// Iterates lines in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &OrderLine> {
        self.lines.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OrderLine> {
        self.lines.iter_mut()
    }

    /// Iterates non-voided lines in insertion order.
    pub fn active(&self) -> impl Iterator<Item = &OrderLine> {
        self.lines.iter().filter(|line| line.is_active())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of non-voided lines.
    pub fn active_count(&self) -> usize {
        self.active().count()
    }
}

impl From<Vec<OrderLine>> for LineMap {
    fn from(lines: Vec<OrderLine>) -> Self {
        let index = lines
            .iter()
            .enumerate()
            .map(|(pos, line)| (line.id, pos))
            .collect();
        Self { lines, index }
    }
}

impl From<LineMap> for Vec<OrderLine> {
    fn from(map: LineMap) -> Self {
        map.lines
    }
}

impl<'a> IntoIterator for &'a LineMap {
    type Item = &'a OrderLine;
    type IntoIter = std::slice::Iter<'a, OrderLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, quantity: u32, unit_cents: i64, tax_rate: f64) -> OrderLine {
        OrderLine::from_spec(
            LineId::new(),
            LineItemSpec::new("MENU-001", name, quantity, Money::from_cents(unit_cents), tax_rate),
        )
    }

    #[test]
    fn test_line_total_from_spec() {
        // qty 2 x $10.00 at 10% tax
        let line = line("Burger", 2, 1000, 10.0);
        assert_eq!(line.gross_total().cents(), 2000);
        assert_eq!(line.line_total().cents(), 2000);
        assert_eq!(line.tax_amount().cents(), 200);
    }

    #[test]
    fn test_line_total_includes_modifiers_and_bundles() {
        let spec = LineItemSpec::new("MENU-001", "Combo", 2, Money::from_cents(1000), 0.0)
            .with_modifiers(vec![Modifier::new("Extra cheese", Money::from_cents(150), 2)])
            .with_bundle_components(vec![BundleComponent::new(
                "Upgrade salad",
                Money::from_cents(100),
                2,
            )]);
        let line = OrderLine::from_spec(LineId::new(), spec);

        // 2*1000 + 2*150 + 2*100
        assert_eq!(line.gross_total().cents(), 2500);
    }

    #[test]
    fn test_line_discount_reduces_total_and_tax() {
        let mut line = line("Burger", 2, 1000, 10.0);
        line.discount = Some(LineDiscount {
            kind: DiscountKind::Percentage(50.0),
            reason: "Manager comp".to_string(),
            approved_by: None,
        });

        assert_eq!(line.discount_amount().cents(), 1000);
        assert_eq!(line.line_total().cents(), 1000);
        assert_eq!(line.tax_amount().cents(), 100);
    }

    #[test]
    fn test_line_discount_capped_at_gross_total() {
        let mut line = line("Soda", 1, 300, 0.0);
        line.discount = Some(LineDiscount {
            kind: DiscountKind::FixedAmount(Money::from_cents(1000)),
            reason: "Comp".to_string(),
            approved_by: None,
        });

        assert_eq!(line.line_total().cents(), 0);
    }

    #[test]
    fn test_held_line_cannot_fire() {
        let mut line = line("Steak", 1, 3000, 0.0);
        assert!(line.can_fire());

        line.hold = Some(HoldInfo {
            held_by: EmployeeId::new(),
            reason: "Wait for apps".to_string(),
            held_at: Utc::now(),
        });
        assert!(!line.can_fire());
        assert!(line.can_hold());
    }

    #[test]
    fn test_line_map_preserves_insertion_order() {
        let mut map = LineMap::new();
        let a = line("A", 1, 100, 0.0);
        let b = line("B", 1, 200, 0.0);
        let c = line("C", 1, 300, 0.0);
        let b_id = b.id;

        map.insert(a);
        map.insert(b);
        map.insert(c);

        map.remove(&b_id);

        let names: Vec<_> = map.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_line_map_lookup_after_remove() {
        let mut map = LineMap::new();
        let a = line("A", 1, 100, 0.0);
        let b = line("B", 1, 200, 0.0);
        let a_id = a.id;
        let b_id = b.id;

        map.insert(a);
        map.insert(b);
        map.remove(&a_id);

        assert!(!map.contains(&a_id));
        assert_eq!(map.get(&b_id).map(|l| l.name.as_str()), Some("B"));
    }

    #[test]
    fn test_line_map_insert_replaces_existing() {
        let mut map = LineMap::new();
        let mut a = line("A", 1, 100, 0.0);
        let a_id = a.id;
        map.insert(a.clone());

        a.quantity = 5;
        map.insert(a);

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&a_id).map(|l| l.quantity), Some(5));
    }

    #[test]
    fn test_line_map_serde_round_trip_rebuilds_index() {
        let mut map = LineMap::new();
        let a = line("A", 1, 100, 0.0);
        let b = line("B", 2, 200, 0.0);
        let b_id = b.id;
        map.insert(a);
        map.insert(b);

        let json = serde_json::to_string(&map).unwrap();
        let restored: LineMap = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, map);
        assert_eq!(restored.get(&b_id).map(|l| l.quantity), Some(2));
    }

    #[test]
    fn test_active_excludes_voided() {
        let mut map = LineMap::new();
        let a = line("A", 1, 100, 0.0);
        let mut b = line("B", 1, 200, 0.0);
        b.status = LineStatus::Voided;
        map.insert(a);
        map.insert(b);

        assert_eq!(map.len(), 2);
        assert_eq!(map.active_count(), 1);
    }
}
