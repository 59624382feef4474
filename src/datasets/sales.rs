//! E-commerce orders: top products, monthly revenue, sub-category averages
//! and year-over-year growth.

use crate::config::Config;
use crate::encoding::TextEncoding;
use crate::loader::SourceSpec;
use crate::models::CollectionId;
use crate::pipeline::{AnalysisSpec, Derivation, KeyExpr, Pipeline};
use crate::report::Section;
use crate::schema::{ColumnKind, Schema};

use super::{Analysis, Dataset, DatasetKind};

const ORDER_DATE: &str = "Order Date";

pub fn schema() -> Schema {
    Schema::new()
        .required(ORDER_DATE, ColumnKind::Timestamp { day_first: true })
        .required("Sales", ColumnKind::Number)
        .required("Product ID", ColumnKind::Text)
        .required("Category", ColumnKind::Text)
        .required("Sub-Category", ColumnKind::Text)
}

pub fn dataset(config: &Config) -> Dataset {
    let cfg = &config.datasets.sales;

    let analyses = vec![
        Analysis::new(
            AnalysisSpec::aggregate(
                "top_products",
                Pipeline::default()
                    .key("product_id", KeyExpr::Field("Product ID".into()))
                    .sum("total_sales", "Sales")
                    .sort_desc("total_sales")
                    .limit(5),
            ),
            Section::new("1. Top 5 Products by Total Sales")
                .row("Product ID: {product_id}, Total Sales: ${total_sales:money}"),
        ),
        Analysis::new(
            AnalysisSpec::aggregate(
                "monthly_revenue",
                Pipeline::default()
                    .key("year", KeyExpr::Year(ORDER_DATE.into()))
                    .key("month", KeyExpr::Month(ORDER_DATE.into()))
                    .sum("total_revenue", "Sales")
                    .sort_asc("year")
                    .sort_asc("month"),
            ),
            Section::new("2. Total Revenue per Month (Year-Month)")
                .row("{year}-{month:02}: ${total_revenue:money}")
                .preview(10)
                .footer("... (Total {total} months)"),
        ),
        Analysis::new(
            AnalysisSpec::aggregate(
                "subcategory_averages",
                Pipeline::default()
                    .key("category", KeyExpr::Field("Category".into()))
                    .key("sub_category", KeyExpr::Field("Sub-Category".into()))
                    .avg("avg_sales", "Sales")
                    .rollup("category", "sub_categories"),
            ),
            Section::new("3. Average Sales per Sub-Category (Grouped by Category)")
                .row("\nCategory: {category}")
                .child_row("  - {sub_category}: ${avg_sales:money}"),
        ),
        Analysis::new(
            AnalysisSpec::aggregate(
                "yearly_growth",
                Pipeline::default()
                    .key("year", KeyExpr::Year(ORDER_DATE.into()))
                    .sum("total_sales", "Sales")
                    .sort_asc("year"),
            )
            .derive(Derivation::Growth {
                metric: "total_sales".into(),
                alias: "growth".into(),
            }),
            Section::new("4. Yearly Sales Growth")
                .preamble("Year   | Total Sales     | Growth %  ")
                .preamble(&"-".repeat(35))
                .row("{year:<6} | ${total_sales:money}    | {growth:growth<10}"),
        ),
    ];

    Dataset {
        kind: DatasetKind::Sales,
        source: SourceSpec {
            path: cfg.source.clone(),
            schema: schema(),
            encodings: vec![TextEncoding::Utf8, TextEncoding::Windows1252],
        },
        collection: CollectionId::new(&cfg.database, &cfg.collection),
        log_path: config.output.dir.join(&cfg.log_file),
        announce_loading: true,
        analyses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{run_analysis, AnalysisOutput};
    use crate::loader::parse_records;
    use crate::models::Value;
    use crate::store::memory::MemoryStore;
    use crate::store::{Collection, DocumentStore};

    const ORDERS: &str = "\
Order Date,Product ID,Category,Sub-Category,Sales
08/11/2016,P1,Furniture,Chairs,100
08/11/2016,P2,Furniture,Tables,300
12/06/2016,P1,Office,Paper,50
01/02/2017,P3,Office,Paper,200
15/03/2017,P2,Furniture,Chairs,\n";

    #[tokio::test]
    async fn test_sales_battery_over_memory_store() {
        let dataset = dataset(&Config::default());
        let records = parse_records(ORDERS, &dataset.source.schema).unwrap();
        let store = MemoryStore::new();
        store.insert_many(&dataset.collection, &records).await.unwrap();

        let coll = Collection::new(&store, &dataset.collection);
        let mut groups: Vec<Vec<crate::models::Group>> = Vec::new();
        for analysis in &dataset.analyses {
            match run_analysis(&coll, &analysis.spec).await.unwrap() {
                AnalysisOutput::Groups(g) => groups.push(g),
                AnalysisOutput::Records(_) => panic!("unexpected records"),
            }
        }

        // top products
        assert_eq!(groups[0][0].get("product_id"), &Value::Text("P2".into()));
        assert_eq!(groups[0][0].get("total_sales"), &Value::Float(300.0));

        // day-first dates: 08/11/2016 is 8 November
        let months: Vec<(Value, Value)> = groups[1]
            .iter()
            .map(|g| (g.get("year").clone(), g.get("month").clone()))
            .collect();
        assert_eq!(
            months,
            vec![
                (Value::Int(2016), Value::Int(6)),
                (Value::Int(2016), Value::Int(11)),
                (Value::Int(2017), Value::Int(2)),
                (Value::Int(2017), Value::Int(3)),
            ]
        );

        // rollup: two categories, Furniture first seen
        assert_eq!(groups[2].len(), 2);
        assert_eq!(groups[2][0].get("category"), &Value::Text("Furniture".into()));
        assert_eq!(groups[2][0].children.len(), 2);

        // growth 450 -> 200
        assert_eq!(groups[3][0].get("growth"), &Value::Missing);
        let growth = groups[3][1].get("growth").as_f64().unwrap();
        assert!((growth - (-55.555_555)).abs() < 1e-3);
    }
}
