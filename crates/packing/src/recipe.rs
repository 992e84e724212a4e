//! Recipe input: the list of ingredients to pack.
//!
//! A recipe is checked once against the compartment tree before any grid
//! work starts. Malformed ingredients, unknown compartments and unknown
//! partners all fail with [`Error::Configuration`].

use crate::ingredient::Ingredient;
use std::collections::HashMap;
use u_cellpack_core::{Error, Result};
use u_cellpack_grid::CompartmentTree;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Named list of ingredients.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Recipe {
    /// Recipe name.
    pub name: String,
    ingredients: Vec<Ingredient>,
}

impl Recipe {
    /// Creates an empty recipe.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ingredients: Vec::new(),
        }
    }

    /// Adds an ingredient.
    pub fn with_ingredient(mut self, ingredient: Ingredient) -> Self {
        self.ingredients.push(ingredient);
        self
    }

    /// Adds an ingredient in place.
    pub fn push(&mut self, ingredient: Ingredient) {
        self.ingredients.push(ingredient);
    }

    /// Ingredients in recipe order.
    pub fn ingredients(&self) -> &[Ingredient] {
        &self.ingredients
    }

    /// Number of ingredients.
    pub fn len(&self) -> usize {
        self.ingredients.len()
    }

    /// True when the recipe holds no ingredient.
    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty()
    }

    /// Validates every ingredient against `compartments` and resolves
    /// partner names to recipe indices.
    pub fn resolve(self, compartments: &CompartmentTree) -> Result<Vec<Ingredient>> {
        let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(self.ingredients.len());
        for (i, ingredient) in self.ingredients.iter().enumerate() {
            ingredient.validate()?;
            if by_name.insert(ingredient.name.as_str(), i).is_some() {
                return Err(Error::Configuration(format!(
                    "duplicate ingredient name '{}'",
                    ingredient.name
                )));
            }
            let number = ingredient.compartment.saturating_abs();
            if number != 0 && compartments.by_number(number).is_none() {
                return Err(Error::Configuration(format!(
                    "ingredient '{}' references unknown compartment {}",
                    ingredient.name, ingredient.compartment
                )));
            }
        }

        let mut resolved: Vec<Vec<usize>> = Vec::with_capacity(self.ingredients.len());
        for ingredient in &self.ingredients {
            let ids = ingredient
                .partners
                .iter()
                .map(|p| {
                    by_name.get(p.name.as_str()).copied().ok_or_else(|| {
                        Error::Configuration(format!(
                            "ingredient '{}' references unknown partner '{}'",
                            ingredient.name, p.name
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            resolved.push(ids);
        }

        let mut ingredients = self.ingredients;
        for (ingredient, ids) in ingredients.iter_mut().zip(resolved) {
            for (partner, id) in ingredient.partners.iter_mut().zip(ids) {
                partner.ingredient = Some(id);
            }
        }
        Ok(ingredients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingredient::PackingMode;
    use u_cellpack_core::geometry::{Pt3, Vec3};
    use u_cellpack_grid::Compartment;

    fn tree() -> CompartmentTree {
        let mut tree = CompartmentTree::new();
        tree.add(Compartment::sphere("cell", Pt3::origin(), 100.0), None)
            .unwrap();
        tree
    }

    #[test]
    fn test_resolve_partners() {
        let recipe = Recipe::new("r")
            .with_ingredient(Ingredient::sphere("receptor", 10.0).with_compartment(1))
            .with_ingredient(
                Ingredient::sphere("ligand", 3.0)
                    .with_compartment(-1)
                    .with_packing_mode(PackingMode::ClosePartner)
                    .with_partner("receptor", Vec3::new(0.0, 0.0, 12.0)),
            );
        let ingredients = recipe.resolve(&tree()).unwrap();
        assert_eq!(ingredients[1].partners[0].ingredient, Some(0));
    }

    #[test]
    fn test_unknown_partner() {
        let recipe = Recipe::new("r").with_ingredient(
            Ingredient::sphere("ligand", 3.0).with_partner("ghost", Vec3::zeros()),
        );
        let err = recipe.resolve(&tree()).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("ghost")));
    }

    #[test]
    fn test_unknown_compartment() {
        let recipe = Recipe::new("r").with_ingredient(Ingredient::sphere("a", 3.0).with_compartment(-2));
        assert!(recipe.resolve(&tree()).is_err());
    }

    #[test]
    fn test_duplicate_names() {
        let recipe = Recipe::new("r")
            .with_ingredient(Ingredient::sphere("a", 3.0))
            .with_ingredient(Ingredient::sphere("a", 4.0));
        assert!(recipe.resolve(&tree()).is_err());
    }
}
