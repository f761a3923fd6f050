//! The `search` command: query all providers and print a result table.

use anyhow::Result;

use xdcc_core::{format_size, ProviderAggregator};

use crate::cli::SearchArgs;
use crate::output::TablePrinter;

/// Column caps for (File Name, Size, URL); the URL column is unbounded.
const COLUMN_MAX_WIDTHS: [Option<usize>; 3] = [Some(100), Some(10), None];

pub async fn run(args: SearchArgs) -> Result<()> {
    let aggregator = ProviderAggregator::with_default_providers();
    let results = aggregator.search(&args.keywords).await;

    let mut printer = TablePrinter::new(&["File Name", "Size", "URL"]);
    printer.set_max_widths(COLUMN_MAX_WIDTHS.to_vec());

    for info in results {
        printer.add_row(vec![
            info.name.clone(),
            format_size(info.size),
            info.locator.to_string(),
        ]);
    }

    let sort_column = if args.sort_by_name { 0 } else { 2 };
    printer.sort_by_column(sort_column);
    printer.print();
    Ok(())
}
