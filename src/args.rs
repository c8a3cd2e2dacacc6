use clap::Parser;

/// This is a reconciliation and analysis program for Danish council election results.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (directory) The directory tree containing the published JSON updates
    /// (candidate rosters, polling area results and mandate distributions).
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (directory or empty) Where to write the reconciled tables and reports.
    /// Defaults to a `reconciled` directory inside the input directory.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path, optional) A JSON file overriding the default run settings.
    /// For more information about the file format, read the manual.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, optional) A JSON file with the official national and party totals.
    /// Values that are left out are not checked.
    #[clap(long, value_parser)]
    pub reference_totals: Option<String>,

    /// (file path, optional) The executive roster, as a CSV file or an Excel
    /// workbook with the columns Kommune, Navn, Parti.
    #[clap(long, value_parser)]
    pub executives: Option<String>,

    /// (file path, optional) A JSON object mapping first names to a category (M or K).
    #[clap(long, value_parser)]
    pub category_overrides: Option<String>,

    /// (file path) A reference aggregates.json from a previous run. If provided, valgrecon will
    /// check that the computed aggregates match the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
