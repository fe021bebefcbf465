//! Closed category taxonomy
//!
//! Every mapping target is a leaf of a fixed tree with four roots:
//!
//! ```text
//! revenue   ventas_mostrador ventas_delivery ventas_app otros_ingresos
//! costs     insumos.{harina queso pepperoni vegetales carnes bebidas otros_insumos}
//! expenses  nomina renta servicios.{electricidad agua gas} marketing mantenimiento otros_gastos
//! taxes     iva isr isn
//! ```
//!
//! Categories are enums rather than strings so an invalid path cannot be
//! constructed. They serialize as their dotted path (`expenses.servicios.agua`).
//! `Category::Unknown` marks unmapped items and belongs to no branch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Path used for the bucket holding unmapped amounts
pub const UNCATEGORIZED: &str = "uncategorized";

/// Root branch of the taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Revenue,
    Costs,
    Expenses,
    Taxes,
}

impl Branch {
    pub const ALL: [Branch; 4] = [Self::Revenue, Self::Costs, Self::Expenses, Self::Taxes];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::Costs => "costs",
            Self::Expenses => "expenses",
            Self::Taxes => "taxes",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Branch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "revenue" => Ok(Self::Revenue),
            "costs" => Ok(Self::Costs),
            "expenses" => Ok(Self::Expenses),
            "taxes" => Ok(Self::Taxes),
            _ => Err(Error::InvalidData(format!("Unknown branch: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RevenueLeaf {
    VentasMostrador,
    VentasDelivery,
    VentasApp,
    OtrosIngresos,
}

/// Food and packaging inputs (`costs.insumos.*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CostLeaf {
    Harina,
    Queso,
    Pepperoni,
    Vegetales,
    Carnes,
    Bebidas,
    OtrosInsumos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExpenseLeaf {
    Nomina,
    Renta,
    Electricidad,
    Agua,
    Gas,
    Marketing,
    Mantenimiento,
    OtrosGastos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaxLeaf {
    Iva,
    Isr,
    /// Impuesto sobre nómina (state payroll tax)
    Isn,
}

/// A mapping target: one leaf of the taxonomy, or `Unknown`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Category {
    Revenue(RevenueLeaf),
    Costs(CostLeaf),
    Expenses(ExpenseLeaf),
    Taxes(TaxLeaf),
    Unknown,
}

/// All leaves in taxonomy order. Keyword ties are broken by this order.
const LEAVES: [Category; 22] = [
    Category::Revenue(RevenueLeaf::VentasMostrador),
    Category::Revenue(RevenueLeaf::VentasDelivery),
    Category::Revenue(RevenueLeaf::VentasApp),
    Category::Revenue(RevenueLeaf::OtrosIngresos),
    Category::Costs(CostLeaf::Harina),
    Category::Costs(CostLeaf::Queso),
    Category::Costs(CostLeaf::Pepperoni),
    Category::Costs(CostLeaf::Vegetales),
    Category::Costs(CostLeaf::Carnes),
    Category::Costs(CostLeaf::Bebidas),
    Category::Costs(CostLeaf::OtrosInsumos),
    Category::Expenses(ExpenseLeaf::Nomina),
    Category::Expenses(ExpenseLeaf::Renta),
    Category::Expenses(ExpenseLeaf::Electricidad),
    Category::Expenses(ExpenseLeaf::Agua),
    Category::Expenses(ExpenseLeaf::Gas),
    Category::Expenses(ExpenseLeaf::Marketing),
    Category::Expenses(ExpenseLeaf::Mantenimiento),
    Category::Expenses(ExpenseLeaf::OtrosGastos),
    Category::Taxes(TaxLeaf::Iva),
    Category::Taxes(TaxLeaf::Isr),
    Category::Taxes(TaxLeaf::Isn),
];

/// Intermediate group nodes
const GROUPS: [&str; 2] = ["costs.insumos", "expenses.servicios"];

impl Category {
    /// Every mapping target, in taxonomy order
    pub fn leaves() -> &'static [Category] {
        &LEAVES
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::Revenue(leaf) => match leaf {
                RevenueLeaf::VentasMostrador => "revenue.ventas_mostrador",
                RevenueLeaf::VentasDelivery => "revenue.ventas_delivery",
                RevenueLeaf::VentasApp => "revenue.ventas_app",
                RevenueLeaf::OtrosIngresos => "revenue.otros_ingresos",
            },
            Self::Costs(leaf) => match leaf {
                CostLeaf::Harina => "costs.insumos.harina",
                CostLeaf::Queso => "costs.insumos.queso",
                CostLeaf::Pepperoni => "costs.insumos.pepperoni",
                CostLeaf::Vegetales => "costs.insumos.vegetales",
                CostLeaf::Carnes => "costs.insumos.carnes",
                CostLeaf::Bebidas => "costs.insumos.bebidas",
                CostLeaf::OtrosInsumos => "costs.insumos.otros_insumos",
            },
            Self::Expenses(leaf) => match leaf {
                ExpenseLeaf::Nomina => "expenses.nomina",
                ExpenseLeaf::Renta => "expenses.renta",
                ExpenseLeaf::Electricidad => "expenses.servicios.electricidad",
                ExpenseLeaf::Agua => "expenses.servicios.agua",
                ExpenseLeaf::Gas => "expenses.servicios.gas",
                ExpenseLeaf::Marketing => "expenses.marketing",
                ExpenseLeaf::Mantenimiento => "expenses.mantenimiento",
                ExpenseLeaf::OtrosGastos => "expenses.otros_gastos",
            },
            Self::Taxes(leaf) => match leaf {
                TaxLeaf::Iva => "taxes.iva",
                TaxLeaf::Isr => "taxes.isr",
                TaxLeaf::Isn => "taxes.isn",
            },
            Self::Unknown => "unknown",
        }
    }

    /// Last path segment (`electricidad`)
    pub fn leaf_name(&self) -> &'static str {
        let path = self.path();
        path.rsplit('.').next().unwrap_or(path)
    }

    pub fn branch(&self) -> Option<Branch> {
        match self {
            Self::Revenue(_) => Some(Branch::Revenue),
            Self::Costs(_) => Some(Branch::Costs),
            Self::Expenses(_) => Some(Branch::Expenses),
            Self::Taxes(_) => Some(Branch::Taxes),
            Self::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Ancestor node paths, nearest first (`expenses.servicios`, `expenses`)
    pub fn ancestors(&self) -> Vec<&'static str> {
        if self.is_unknown() {
            return Vec::new();
        }
        ancestors_of(self.path())
    }

    /// Keyword phrases that map a label to this leaf. Lowercase, accent-free.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Revenue(leaf) => match leaf {
                RevenueLeaf::VentasMostrador => &[
                    "ventas mostrador",
                    "venta mostrador",
                    "mostrador",
                    "ingresos por ventas",
                    "ventas",
                    "venta",
                ],
                RevenueLeaf::VentasDelivery => &[
                    "ventas delivery",
                    "delivery",
                    "domicilio",
                    "servicio a domicilio",
                ],
                RevenueLeaf::VentasApp => &[
                    "ventas app",
                    "app",
                    "aplicacion",
                    "uber eats",
                    "rappi",
                    "didi food",
                ],
                RevenueLeaf::OtrosIngresos => &[
                    "otros ingresos",
                    "ingresos",
                    "ingreso",
                    "intereses ganados",
                ],
            },
            Self::Costs(leaf) => match leaf {
                CostLeaf::Harina => &["harina", "masa"],
                CostLeaf::Queso => &["queso", "mozzarella", "lacteos"],
                CostLeaf::Pepperoni => &["pepperoni", "salami"],
                CostLeaf::Vegetales => &[
                    "vegetales",
                    "verduras",
                    "jitomate",
                    "tomate",
                    "champinon",
                    "cebolla",
                    "pimiento",
                ],
                CostLeaf::Carnes => &["carnes", "carne", "jamon", "pollo", "salchicha", "tocino"],
                CostLeaf::Bebidas => &[
                    "bebidas",
                    "refrescos",
                    "refresco",
                    "agua embotellada",
                    "jugos",
                ],
                CostLeaf::OtrosInsumos => &[
                    "otros insumos",
                    "insumos",
                    "materia prima",
                    "costo de venta",
                    "empaques",
                    "desechables",
                    "cajas",
                    "compras",
                ],
            },
            Self::Expenses(leaf) => match leaf {
                ExpenseLeaf::Nomina => &[
                    "nomina",
                    "sueldo",
                    "salario",
                    "aguinaldo",
                    "imss",
                    "infonavit",
                    "prima vacacional",
                    "bono",
                    "honorarios",
                ],
                ExpenseLeaf::Renta => &["renta", "arrendamiento", "alquiler"],
                ExpenseLeaf::Electricidad => &["energia electrica", "electricidad", "cfe", "luz"],
                ExpenseLeaf::Agua => &["agua"],
                ExpenseLeaf::Gas => &["gas lp", "gas natural", "gas"],
                ExpenseLeaf::Marketing => &[
                    "marketing",
                    "publicidad",
                    "promocion",
                    "redes sociales",
                    "volantes",
                ],
                ExpenseLeaf::Mantenimiento => &[
                    "mantenimiento",
                    "reparacion",
                    "limpieza",
                    "fumigacion",
                ],
                ExpenseLeaf::OtrosGastos => &[
                    "otros gastos",
                    "gastos",
                    "papeleria",
                    "telefono",
                    "internet",
                    "comisiones bancarias",
                    "comision",
                    "seguro",
                ],
            },
            Self::Taxes(leaf) => match leaf {
                TaxLeaf::Iva => &["iva", "impuesto al valor agregado"],
                TaxLeaf::Isr => &["isr", "impuesto sobre la renta"],
                TaxLeaf::Isn => &["isn", "impuesto sobre nomina", "impuesto estatal sobre nomina"],
            },
            Self::Unknown => &[],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

impl FromStr for Category {
    type Err = Error;

    /// Accepts a full path (`expenses.servicios.electricidad`) or an
    /// unambiguous leaf name (`electricidad`).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if s == "unknown" {
            return Ok(Self::Unknown);
        }
        LEAVES
            .iter()
            .find(|c| c.path() == s)
            .or_else(|| LEAVES.iter().find(|c| c.leaf_name() == s))
            .copied()
            .ok_or_else(|| Error::InvalidData(format!("Unknown category: {}", s)))
    }
}

impl TryFrom<String> for Category {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.path().to_string()
    }
}

fn parent_of(path: &str) -> Option<&str> {
    path.rfind('.').map(|i| &path[..i])
}

fn ancestors_of(path: &'static str) -> Vec<&'static str> {
    let mut out = Vec::new();
    let mut current = path;
    while let Some(parent) = parent_of(current) {
        out.push(parent);
        current = parent;
    }
    out
}

/// Every node path in the tree: roots, then groups, then leaves
pub fn all_nodes() -> Vec<&'static str> {
    let mut nodes: Vec<&'static str> = Branch::ALL.iter().map(|b| b.as_str()).collect();
    nodes.extend(GROUPS);
    nodes.extend(LEAVES.iter().map(|c| c.path()));
    nodes
}

/// Direct children of a node path
pub fn children(node: &str) -> Vec<&'static str> {
    all_nodes()
        .into_iter()
        .filter(|n| parent_of(n) == Some(node))
        .collect()
}

/// True if `path` names a node of the tree (root, group or leaf)
pub fn is_node(path: &str) -> bool {
    all_nodes().iter().any(|n| *n == path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_unique() {
        let mut paths: Vec<_> = Category::leaves().iter().map(|c| c.path()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), Category::leaves().len());
    }

    #[test]
    fn test_leaf_names_are_unambiguous() {
        for leaf in Category::leaves() {
            assert_eq!(leaf.leaf_name().parse::<Category>().unwrap(), *leaf);
            assert_eq!(leaf.path().parse::<Category>().unwrap(), *leaf);
        }
    }

    #[test]
    fn test_ancestors() {
        let luz = Category::Expenses(ExpenseLeaf::Electricidad);
        assert_eq!(luz.ancestors(), vec!["expenses.servicios", "expenses"]);
        assert_eq!(luz.branch(), Some(Branch::Expenses));
        assert!(Category::Unknown.ancestors().is_empty());
        assert_eq!(Category::Unknown.branch(), None);
    }

    #[test]
    fn test_children() {
        assert_eq!(
            children("expenses.servicios"),
            vec![
                "expenses.servicios.electricidad",
                "expenses.servicios.agua",
                "expenses.servicios.gas"
            ]
        );
        assert_eq!(children("costs"), vec!["costs.insumos"]);
        assert_eq!(children("taxes").len(), 3);
        assert!(children("taxes.iva").is_empty());
    }

    #[test]
    fn test_serde_as_path() {
        let json = serde_json::to_string(&Category::Taxes(TaxLeaf::Isr)).unwrap();
        assert_eq!(json, "\"taxes.isr\"");
        let back: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Category::Taxes(TaxLeaf::Isr));
        assert!(serde_json::from_str::<Category>("\"expenses.viajes\"").is_err());
    }

    #[test]
    fn test_every_leaf_has_keywords() {
        for leaf in Category::leaves() {
            assert!(!leaf.keywords().is_empty(), "{} has no keywords", leaf);
        }
    }
}
