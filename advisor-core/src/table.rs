use std::collections::BTreeSet;
use std::fmt;

use advisor_sdk::{NOT_AVAILABLE, Recommendation};
use serde::Serialize;

use crate::scope::ScopeMode;

/// Columns a report table can carry, in their fixed display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Subscription,
    Category,
    Problem,
    Solution,
    Impact,
    ResourceGroup,
    Resource,
}

impl Column {
    pub fn header(&self) -> &'static str {
        match self {
            Column::Subscription => "Subscription",
            Column::Category => "Category",
            Column::Problem => "Problem",
            Column::Solution => "Solution",
            Column::Impact => "Impact",
            Column::ResourceGroup => "Resource Group",
            Column::Resource => "Resource",
        }
    }

    fn value(&self, record: &Recommendation) -> String {
        match self {
            Column::Subscription => record
                .subscription_id
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            Column::Category => record.category.to_string(),
            Column::Problem => record.problem.clone(),
            Column::Solution => record.solution.clone(),
            Column::Impact => record.impact.to_string(),
            Column::ResourceGroup => record.resource_group.clone(),
            Column::Resource => record.resource_name.clone(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Which resource column, if any, a report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceDimension {
    Omitted,
    #[default]
    ResourceGroup,
    Resource,
}

impl ResourceDimension {
    pub fn column(&self) -> Option<Column> {
        match self {
            ResourceDimension::Omitted => None,
            ResourceDimension::ResourceGroup => Some(Column::ResourceGroup),
            ResourceDimension::Resource => Some(Column::Resource),
        }
    }
}

/// Scope mode crossed with resource dimension; fixes the column schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportMode {
    pub scope: ScopeMode,
    pub resource: ResourceDimension,
}

impl ReportMode {
    pub fn new(scope: ScopeMode, resource: ResourceDimension) -> Self {
        Self { scope, resource }
    }

    pub fn columns(&self) -> Vec<Column> {
        let mut columns = Vec::with_capacity(6);
        if self.scope.is_multi() {
            columns.push(Column::Subscription);
        }
        columns.extend([
            Column::Category,
            Column::Problem,
            Column::Solution,
            Column::Impact,
        ]);
        columns.extend(self.resource.column());
        columns
    }
}

/// Named-column table; every row has exactly one cell per column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn headers(&self) -> Vec<&'static str> {
        self.columns.iter().map(Column::header).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: Column) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }

    pub fn values(&self, column: Column) -> Option<impl Iterator<Item = &str>> {
        let index = self.column_index(column)?;
        Some(self.rows.iter().map(move |row| row[index].as_str()))
    }

    pub fn distinct_count(&self, column: Column) -> Option<usize> {
        self.values(column)
            .map(|values| values.collect::<BTreeSet<_>>().len())
    }

    /// The resource column present in this table, if any.
    pub fn resource_column(&self) -> Option<Column> {
        self.columns
            .iter()
            .copied()
            .find(|c| matches!(c, Column::ResourceGroup | Column::Resource))
    }
}

/// Builds the table for `records`; the column set is decided by `mode` alone.
pub fn format_table(records: &[Recommendation], mode: ReportMode) -> Table {
    let columns = mode.columns();
    let rows = records
        .iter()
        .map(|record| columns.iter().map(|column| column.value(record)).collect())
        .collect();
    Table { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_sdk::{Category, Impact};

    fn record(category: Category, group: Option<&str>) -> Recommendation {
        Recommendation::new(category, "problem", "solution", Impact::Medium)
            .with_resource(group, None)
    }

    #[test]
    fn single_subscription_without_resource_has_four_columns() {
        let mode = ReportMode::new(ScopeMode::SingleSubscription, ResourceDimension::Omitted);
        let table = format_table(&[record(Category::Cost, None)], mode);
        assert_eq!(table.headers(), vec!["Category", "Problem", "Solution", "Impact"]);
        assert_eq!(table.rows()[0], vec!["Cost", "problem", "solution", "Medium"]);
    }

    #[test]
    fn multi_subscription_with_group_has_six_columns() {
        let mode = ReportMode::new(ScopeMode::ExplicitList, ResourceDimension::ResourceGroup);
        let rec = record(Category::Security, Some("rg-a")).tagged("sub-1");
        let table = format_table(&[rec], mode);
        assert_eq!(
            table.headers(),
            vec!["Subscription", "Category", "Problem", "Solution", "Impact", "Resource Group"]
        );
        assert_eq!(table.rows()[0][0], "sub-1");
        assert_eq!(table.rows()[0][5], "rg-a");
    }

    #[test]
    fn columns_are_uniform_even_when_metadata_is_missing() {
        let mode = ReportMode::new(ScopeMode::SingleSubscription, ResourceDimension::Resource);
        let table = format_table(
            &[record(Category::Cost, Some("rg")), record(Category::Cost, None)],
            mode,
        );
        assert!(table.rows().iter().all(|row| row.len() == table.columns().len()));
        assert_eq!(table.rows()[1][4], "N/A");
    }

    #[test]
    fn values_are_not_truncated() {
        let long = "x".repeat(500);
        let rec = Recommendation::new(Category::Cost, long.clone(), "s", Impact::Low);
        let mode = ReportMode::new(ScopeMode::SingleSubscription, ResourceDimension::Omitted);
        let table = format_table(&[rec], mode);
        assert_eq!(table.rows()[0][1], long);
    }

    #[test]
    fn distinct_count_includes_sentinel_once() {
        let mode = ReportMode::new(ScopeMode::SingleSubscription, ResourceDimension::ResourceGroup);
        let table = format_table(
            &[
                record(Category::Cost, Some("rg-a")),
                record(Category::Cost, None),
                record(Category::Cost, Some("rg-a")),
                record(Category::Cost, None),
                record(Category::Cost, Some("rg-b")),
            ],
            mode,
        );
        assert_eq!(table.distinct_count(Column::ResourceGroup), Some(3));
        assert_eq!(table.distinct_count(Column::Subscription), None);
    }
}
