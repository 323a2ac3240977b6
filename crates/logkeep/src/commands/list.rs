//! List command implementation

use anyhow::Result;

use crate::cli::ArchiveArgs;
use crate::output::print_workload_table;

pub async fn execute(args: ArchiveArgs) -> Result<()> {
    let reader = super::get_reader(&args);
    let workloads = reader.workloads()?;
    print_workload_table(&workloads);
    Ok(())
}
