//! Subcommand handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use bill_core::error::BillError;
use bill_core::models::{is_composite_id, BillDraft, GUEST_RECORDER};
use bill_core::period;
use bill_core::settings::{Command, DraftArgs, Settings};
use bill_core::time_utils::resolve_timezone;
use bill_data::export;
use bill_data::history::{HistoryAction, HistoryEntry, HistoryLog};
use bill_data::store::{BillStore, JsonFileStore, RecordFilter};
use bill_runtime::ocr::OcrClient;
use bill_runtime::orchestrator::{ProjectionOrchestrator, ProjectionSnapshot};
use bill_runtime::retry::RetryPolicy;
use bill_ui::app::App;
use bill_ui::comparison_view::summary_lines;
use bill_ui::table_view::{build_rows, BillRow, COLUMN_TITLES};
use chrono::Utc;
use chrono_tz::Tz;
use tokio::sync::watch;
use unicode_width::UnicodeWidthStr;

/// How often `watch` re-reads the store file for writes by other processes.
pub const RELOAD_INTERVAL: Duration = Duration::from_secs(2);

/// Whether `command` takes over the terminal.
pub fn is_interactive(command: &Command) -> bool {
    matches!(command, Command::List { plain: false } | Command::Watch)
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Everything a subcommand needs: settings, the opened store, and the
/// history log.
pub struct Context {
    pub settings: Settings,
    pub store: Arc<JsonFileStore>,
    pub history: HistoryLog,
    pub timezone: Tz,
}

impl Context {
    pub fn open(settings: Settings) -> Result<Self> {
        let data_dir = settings.data_dir();
        let store = JsonFileStore::open(&data_dir)
            .with_context(|| format!("opening bill store in {}", data_dir.display()))?;
        let timezone = resolve_timezone(&settings.timezone);
        Ok(Self {
            history: HistoryLog::new(&data_dir),
            store: Arc::new(store),
            timezone,
            settings,
        })
    }

    fn filter(&self) -> RecordFilter {
        RecordFilter::for_user(self.settings.user_id(), self.settings.admin)
    }

    fn recorder_name(&self) -> &str {
        self.settings
            .recorder_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(GUEST_RECORDER)
    }

    fn user_label(&self) -> String {
        if self.settings.admin {
            format!("管理者 {}", self.recorder_name())
        } else {
            self.recorder_name().to_string()
        }
    }

    /// Project the current store contents for the selected view.
    fn snapshot(&self) -> Result<ProjectionSnapshot> {
        let records = self.store.snapshot(&self.filter())?;
        Ok(ProjectionSnapshot::build(
            &records,
            &self.settings.view_mode(),
            self.settings.recorder_filter(),
        ))
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Add(args) => self.add(&args),
            Command::Scan {
                image,
                save,
                overrides,
            } => self.scan(image, save, &overrides).await,
            Command::Delete { id } => self.delete(&id),
            Command::List { plain: true } => self.print_list(),
            Command::List { plain: false } => self.run_view(false).await,
            Command::Watch => self.run_view(true).await,
            Command::Compare => self.compare(),
            Command::Export { output } => self.export(output),
            Command::Normalize { text } => {
                println!("{}", period::normalize(&text));
                Ok(())
            }
            Command::History { limit } => self.print_history(limit),
        }
    }

    // ── Record writes ─────────────────────────────────────────────────────────

    fn add(&self, args: &DraftArgs) -> Result<()> {
        let mut draft = BillDraft::new(self.settings.recorder_name.as_deref());
        args.apply_to(&mut draft);
        self.save_draft(&draft)
    }

    fn save_draft(&self, draft: &BillDraft) -> Result<()> {
        let new = draft.validate(self.settings.user_id())?;
        let contract = new.contract_type.clone();
        let recorder = new.recorder_name.clone();
        let id = self.store.create(new)?;

        self.history.record(HistoryEntry::new(
            HistoryAction::Create,
            format!("ID:{id}「{contract}」のデータを登録しました。"),
            recorder.as_str(),
            self.settings.user_id(),
        ));
        println!("「{recorder} - {contract}」の検針票データを正常に登録しました！ (ID: {id})");
        Ok(())
    }

    async fn scan(&self, image: PathBuf, save: bool, overrides: &DraftArgs) -> Result<()> {
        let policy = RetryPolicy::default().with_max_retries(self.settings.ocr_max_retries);
        let client = OcrClient::new(
            self.settings.api_key.as_deref(),
            &self.settings.ocr_model,
            policy,
        )?;

        tracing::info!(image = %image.display(), "extracting bill from slip");
        let extraction = client
            .extract_file(&image)
            .await
            .with_context(|| format!("reading slip {}", image.display()))?;

        let mut draft = BillDraft::new(self.settings.recorder_name.as_deref());
        draft.apply_extraction(&extraction);
        overrides.apply_to(&mut draft);

        for line in draft_lines(&draft) {
            println!("{line}");
        }
        if save {
            self.save_draft(&draft)
        } else {
            println!();
            println!("内容を確認し、--save を付けて再実行すると登録されます。");
            Ok(())
        }
    }

    fn delete(&self, id: &str) -> Result<()> {
        if is_composite_id(id) {
            return Err(BillError::CompositeRecord(id.to_string()).into());
        }
        let visible = self.store.snapshot(&self.filter())?;
        let Some(record) = visible.iter().find(|r| r.id == id) else {
            bail!(BillError::RecordNotFound(id.to_string()));
        };
        let contract = record.contract_type.clone();

        self.store.delete(id)?;
        self.history.record(HistoryEntry::new(
            HistoryAction::Delete,
            format!("ID:{id}「{contract}」のデータを削除しました。"),
            self.recorder_name(),
            self.settings.user_id(),
        ));
        println!("データ ID:{id} を削除しました。");
        Ok(())
    }

    // ── Views ─────────────────────────────────────────────────────────────────

    fn print_list(&self) -> Result<()> {
        let snapshot = self.snapshot()?;
        let label = snapshot.mode.label();
        println!("{}", list_header(&snapshot));
        if snapshot.records.is_empty() {
            println!("該当するデータはありません。");
            return Ok(());
        }
        print!("{}", render_plain_table(&build_rows(&snapshot.records, self.timezone)));
        println!();
        for line in summary_lines(snapshot.comparison.as_ref(), &label) {
            println!("{line}");
        }
        Ok(())
    }

    fn compare(&self) -> Result<()> {
        let snapshot = self.snapshot()?;
        for line in summary_lines(snapshot.comparison.as_ref(), &snapshot.mode.label()) {
            println!("{line}");
        }
        Ok(())
    }

    fn export(&self, output: Option<PathBuf>) -> Result<()> {
        let snapshot = self.snapshot()?;
        let path = output.unwrap_or_else(|| {
            PathBuf::from(export::default_file_name(Utc::now(), self.timezone))
        });
        export::write_csv(&path, &snapshot.records, self.timezone)?;
        println!(
            "{}件のデータを {} に出力しました。",
            snapshot.records.len(),
            path.display()
        );
        Ok(())
    }

    fn print_history(&self, limit: usize) -> Result<()> {
        let entries = self.history.recent(limit)?;
        if entries.is_empty() {
            println!("履歴はありません。");
        }
        for entry in entries {
            println!(
                "{}  [{}] {} ({})",
                entry
                    .timestamp
                    .with_timezone(&self.timezone)
                    .format("%Y/%m/%d %H:%M"),
                entry.action.label(),
                entry.details,
                entry.recorder_name
            );
        }
        Ok(())
    }

    /// Run the full-screen view. With `poll_store`, the store file is
    /// re-read every [`RELOAD_INTERVAL`] so writes from other processes show
    /// up live.
    async fn run_view(&self, poll_store: bool) -> Result<()> {
        let records_rx = self.store.subscribe(self.filter());
        let (mode_tx, mode_rx) = watch::channel(self.settings.view_mode());

        let orchestrator = ProjectionOrchestrator::new(records_rx, mode_rx)
            .with_recorder_filter(self.settings.recorder_filter().map(str::to_string));
        let (rx, handle) = orchestrator.start();

        let poller = poll_store.then(|| {
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(RELOAD_INTERVAL);
                loop {
                    ticker.tick().await;
                    if let Err(e) = store.reload() {
                        tracing::warn!(error = %e, "failed to reload bill store");
                    }
                }
            })
        });

        let app = App::new(
            &self.settings.theme,
            self.timezone,
            self.user_label(),
            self.settings.view_mode(),
        );

        // The TUI exits on 'q' / Ctrl+C itself; the signal covers the window
        // before raw mode is enabled.
        let result = tokio::select! {
            result = app.run(rx, mode_tx) => result.context("terminal error"),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; shutting down");
                Ok(())
            }
        };

        handle.abort();
        if let Some(poller) = poller {
            poller.abort();
        }
        result
    }
}

// ── Plain output ──────────────────────────────────────────────────────────────

/// Labelled draft fields for review before saving. A billing period that
/// did not normalize is flagged.
fn draft_lines(draft: &BillDraft) -> Vec<String> {
    let or_blank = |s: &str| {
        if s.is_empty() {
            "(未入力)".to_string()
        } else {
            s.to_string()
        }
    };
    let period = if draft.billing_date.is_empty() || period::is_canonical(&draft.billing_date) {
        or_blank(&draft.billing_date)
    } else {
        format!("{}  (形式を確認してください 例: R7 6月分)", draft.billing_date)
    };
    vec![
        format!("記録者名:   {}", or_blank(&draft.recorder_name)),
        format!("契約種別:   {}", or_blank(&draft.contract_type)),
        format!("料金年月分: {period}"),
        format!("使用量:     {}", or_blank(&draft.usage_kwh)),
        format!("合計料金:   {}", or_blank(&draft.total_cost)),
        format!("日数:       {}", or_blank(&draft.period_days)),
        format!("メモ:       {}", or_blank(&draft.notes)),
    ]
}

/// `{view} ({n}件)`, noting how many stored records the view was built from
/// when merging or filtering changed the count.
fn list_header(snapshot: &ProjectionSnapshot) -> String {
    let label = snapshot.mode.label();
    let shown = snapshot.records.len();
    if shown == snapshot.source_count {
        format!("{label} ({shown}件)")
    } else {
        format!("{label} ({shown}件 / 元データ {}件)", snapshot.source_count)
    }
}

fn pad(cell: &str, width: usize) -> String {
    let fill = width.saturating_sub(cell.width());
    format!("{cell}{}", " ".repeat(fill))
}

/// Lay out `rows` as a text table, aligning by display width so full-width
/// characters line up.
pub fn render_plain_table(rows: &[BillRow]) -> String {
    let mut widths: Vec<usize> = COLUMN_TITLES.iter().map(|t| t.width()).collect();
    for row in rows {
        for (i, cell) in row.cells().iter().enumerate() {
            widths[i] = widths[i].max(cell.width());
        }
    }

    let line = |cells: &[&str]| -> String {
        let joined = cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| pad(c, *w))
            .collect::<Vec<_>>()
            .join("  ");
        format!("{}\n", joined.trim_end())
    };

    let mut out = line(&COLUMN_TITLES);
    let total: usize = widths.iter().sum::<usize>() + 2 * (widths.len() - 1);
    out.push_str(&"-".repeat(total));
    out.push('\n');
    for row in rows {
        let marker = if row.merged { "*" } else { "" };
        let mut cells = row.cells();
        let recorder = format!("{}{marker}", cells[0]);
        cells[0] = &recorder;
        out.push_str(&line(&cells));
    }
    out
}

// ── Tests ──────────────────────────────────────────────────────────────────────
