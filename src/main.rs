use anyhow::Context;
use clap::{Parser, Subcommand};
use erg_log::models::{Destination, WorkoutResult};
use erg_log::vision::VisionClient;
use erg_log::{power, server, writer};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
  name = "erg-log",
  about = "Extract workout data from rowing ergometer screen photos and log it to spreadsheets"
)]
struct Cli {
  #[command(subcommand)]
  cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Process one erg screen image into a spreadsheet destination
  Process {
    /// Path to the ergometer screen image
    image: PathBuf,

    /// Type of workout shown on the screen
    #[arg(long, default_value = "regular")]
    workout_type: String,

    /// Name of the rower
    #[arg(long, default_value = "John C150")]
    name: String,

    /// Output workbook to create
    #[arg(long, default_value = "output.xlsx")]
    output: PathBuf,

    /// Append to an existing workbook instead of creating one
    #[arg(long, conflicts_with = "output")]
    append: Option<PathBuf>,

    /// Create a Google Sheet instead of a workbook
    #[arg(long)]
    sheets: bool,

    /// Title for the new Google Sheet (defaults to "<name> - <timestamp>")
    #[arg(long, requires = "sheets")]
    sheet_name: Option<String>,

    /// Append to an existing Google Sheet by URL
    #[arg(long, requires = "sheets", conflicts_with = "sheet_name")]
    sheet_url: Option<String>,
  },

  /// Run the web interface
  Serve {
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Directory generated workbooks are written to
    #[arg(long, default_value = "outputs")]
    output_dir: PathBuf,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into()),
    )
    .init();

  match Cli::parse().cmd {
    Cmd::Process {
      image,
      workout_type,
      name,
      output,
      append,
      sheets,
      sheet_name,
      sheet_url,
    } => {
      let workout_type = workout_type.parse().map_err(anyhow::Error::msg)?;
      let bytes =
        std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;

      let client = VisionClient::from_env()?;
      let mut data = client.extract(&bytes, workout_type).await?;
      power::fill_derived(&mut data);

      let result = WorkoutResult {
        data,
        rower_name: name,
      };
      println!("{}", serde_json::to_string_pretty(&result)?);

      let destination = if sheets {
        match sheet_url {
          Some(url) => Destination::ExistingOnlineSheet { url },
          None => Destination::NewOnlineSheet { title: sheet_name },
        }
      } else {
        match append {
          Some(path) => Destination::ExistingWorkbook(path),
          None => Destination::NewWorkbook(output),
        }
      };

      let location = writer::write(&result, &destination).await?;
      println!("Workout written to {}", location);
      Ok(())
    }

    Cmd::Serve { port, output_dir } => server::run(port, output_dir).await,
  }
}
