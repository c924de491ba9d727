use serde::Serialize;

use crate::table::{Column, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DistinctCount {
    pub column: Column,
    pub count: usize,
}

/// Totals shown under every rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    /// Distinct values of the resource column; `N/A` counts once.
    pub distinct_resources: Option<DistinctCount>,
}

impl ReportSummary {
    pub fn from_table(table: &Table) -> Self {
        let distinct_resources = table.resource_column().and_then(|column| {
            table
                .distinct_count(column)
                .map(|count| DistinctCount { column, count })
        });
        Self {
            total: table.len(),
            distinct_resources,
        }
    }

    pub fn distinct_label(&self) -> Option<String> {
        self.distinct_resources.map(|distinct| {
            let noun = match distinct.column {
                Column::Resource => "Resources",
                _ => "Resource groups",
            };
            format!("{noun} impacted: {}", distinct.count)
        })
    }
}
