//! Product Scope

use rustc_hash::FxHashSet;

use crate::{
    ids::{CategoryId, ProductId},
    orders::LineItem,
};

/// Products and categories a promotion applies to. An empty scope applies to
/// every product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductScope {
    products: FxHashSet<ProductId>,
    categories: FxHashSet<CategoryId>,
}

impl ProductScope {
    /// Scope covering all products.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a scope from product and category sets.
    pub fn new(
        products: impl IntoIterator<Item = ProductId>,
        categories: impl IntoIterator<Item = CategoryId>,
    ) -> Self {
        Self {
            products: products.into_iter().collect(),
            categories: categories.into_iter().collect(),
        }
    }

    /// Include a product.
    #[must_use]
    pub fn with_product(mut self, product: impl Into<ProductId>) -> Self {
        self.products.insert(product.into());
        self
    }

    /// Include a category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<CategoryId>) -> Self {
        self.categories.insert(category.into());
        self
    }

    /// Whether the scope places no restriction on products.
    pub fn is_all(&self) -> bool {
        self.products.is_empty() && self.categories.is_empty()
    }

    /// Whether the line is covered by the scope.
    pub fn matches(&self, line: &LineItem) -> bool {
        self.is_all()
            || self.products.contains(line.product())
            || line
                .categories()
                .iter()
                .any(|category| self.categories.contains(category))
    }
}
