//! Interactive terminal browser over the Redump index.

mod progress;

use std::io::{BufRead, Write};
use std::ops::Range;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogSource, Category, HttpCatalog, Item, build_http_client};
use crate::classify::ItemState;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::filter::{TitleFilter, filter_items, page_count, paginate};
use crate::worker::{DownloadQueue, Enqueued, Pipeline, spawn_worker};

pub use progress::{TerminalProgress, make_progress_bar, print_summary};

/// A browser command typed at the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `n`: next page.
    Next,
    /// `p`: previous page.
    Prev,
    /// `f`: prompt for a new filter.
    Filter,
    /// `a`: queue every filtered title not yet downloaded.
    QueueAll,
    /// `q`: stop browsing and wait for the queue to drain.
    Quit,
    /// A number: queue that entry of the filtered list.
    Select(usize),
    /// Anything else.
    Invalid,
}

impl Command {
    /// Parses one line of input. Keys are case-insensitive.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "n" => Self::Next,
            "p" => Self::Prev,
            "f" => Self::Filter,
            "a" => Self::QueueAll,
            "q" => Self::Quit,
            other => other.parse().map_or(Self::Invalid, Self::Select),
        }
    }
}

/// Paging and filtering state over one category's titles.
#[derive(Debug, Clone)]
pub struct Browser {
    items: Vec<Item>,
    filter: TitleFilter,
    page: usize,
    page_size: usize,
}

impl Browser {
    /// Creates a browser showing all of `items`.
    #[must_use]
    pub fn new(items: Vec<Item>, page_size: usize) -> Self {
        Self {
            items,
            filter: TitleFilter::All,
            page: 0,
            page_size: page_size.max(1),
        }
    }

    /// Replaces the filter and returns to the first page.
    pub fn set_filter(&mut self, pattern: &str) {
        self.filter = TitleFilter::parse(pattern);
        self.page = 0;
    }

    /// Titles passing the current filter.
    #[must_use]
    pub fn filtered(&self) -> Vec<&Item> {
        filter_items(&self.items, &self.filter)
    }

    /// Zero-based current page.
    #[must_use]
    pub const fn page(&self) -> usize {
        self.page
    }

    /// Number of pages for the current filter.
    #[must_use]
    pub fn pages(&self) -> usize {
        page_count(self.filtered().len(), self.page_size)
    }

    /// Range of the filtered list shown on the current page.
    #[must_use]
    pub fn page_range(&self) -> Range<usize> {
        paginate(self.filtered().len(), self.page, self.page_size)
    }

    /// Entries on the current page, with their index in the filtered list.
    #[must_use]
    pub fn page_items(&self) -> Vec<(usize, &Item)> {
        let filtered = self.filtered();
        let range = paginate(filtered.len(), self.page, self.page_size);
        range.clone().zip(filtered[range].iter().copied()).collect()
    }

    /// Advances a page. Returns false on the last page.
    pub fn next_page(&mut self) -> bool {
        if self.page + 1 < self.pages() {
            self.page += 1;
            true
        } else {
            false
        }
    }

    /// Goes back a page. Returns false on the first page.
    pub const fn prev_page(&mut self) -> bool {
        if self.page > 0 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    /// The `index`-th entry of the filtered list.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Item> {
        self.filtered().get(index).copied()
    }
}

/// Categories whose title contains `query`, ignoring case. Empty matches all.
#[must_use]
pub fn match_categories<'a>(categories: &'a [Category], query: &str) -> Vec<&'a Category> {
    let query = query.trim().to_lowercase();
    categories
        .iter()
        .filter(|c| c.title.to_lowercase().contains(&query))
        .collect()
}

/// Tag shown after a listed title, if any.
#[must_use]
pub const fn status_tag(state: ItemState, in_flight: bool) -> Option<&'static str> {
    if in_flight {
        return Some("queued");
    }
    match state {
        ItemState::Absent => None,
        other => Some(other.label()),
    }
}

/// Lines from stdin, read on a dedicated thread.
struct LineReader {
    lines: mpsc::UnboundedReceiver<String>,
}

impl LineReader {
    fn spawn() -> Result<Self> {
        let (tx, lines) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("stdin".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                let mut line = String::new();
                loop {
                    line.clear();
                    match stdin.lock().read_line(&mut line) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let text = line.trim_end_matches(['\r', '\n']).to_string();
                            if tx.send(text).is_err() {
                                break;
                            }
                        }
                    }
                }
            })?;
        Ok(Self { lines })
    }

    /// Prints `prompt` and waits for a line. `None` on EOF or cancellation.
    async fn ask(&mut self, prompt: &str, token: &CancellationToken) -> Option<String> {
        print!("{prompt}");
        let _ = std::io::stdout().flush();
        tokio::select! {
            biased;
            () = token.cancelled() => None,
            line = self.lines.recv() => line,
        }
    }
}

/// Runs the interactive browser until the user quits.
///
/// # Errors
///
/// Returns an error if the index cannot be fetched or the terminal cannot be
/// read.
pub async fn run(config: AppConfig) -> Result<()> {
    println!("== Redump Myrient Browser ==");

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Received SIGINT");
            ctrl_c.cancel();
        }
    });

    let http = build_http_client(config.download.request_timeout())?;
    let catalog = HttpCatalog::new(http.clone(), &config.catalog.base_url);
    let mut input = LineReader::spawn()?;

    let categories = catalog.fetch_categories().await?;
    if categories.is_empty() {
        return Err(Error::Catalog(format!(
            "no categories found at {}",
            catalog.base_url()
        )));
    }
    let Some(category) = choose_category(&categories, &mut input, &token).await else {
        return Ok(());
    };
    let items = catalog.fetch_items(&category.url).await?;

    let progress = Arc::new(TerminalProgress::new());
    let pipeline = Arc::new(Pipeline::from_config(&config, http, progress));
    let (queue, worker) = spawn_worker(pipeline, config.download.queue_capacity, token.clone());

    let mut browser = Browser::new(items, config.catalog.page_size);
    browse(&mut browser, &queue, &mut input, &token).await;

    let pending = queue.tracker().has_in_flight();
    queue.close();
    if pending && !token.is_cancelled() {
        println!("Waiting for queued downloads to finish (Ctrl-C to stop)...");
    }
    let stats = worker
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("download worker failed: {e}"))))?;
    print_summary(&stats);
    Ok(())
}

async fn choose_category(
    categories: &[Category],
    input: &mut LineReader,
    token: &CancellationToken,
) -> Option<Category> {
    loop {
        println!("\nEnter a category, or ENTER to show all:");
        let query = input.ask("> ", token).await?;
        let matches = match_categories(categories, &query);
        if matches.is_empty() {
            println!("No results. Try again.");
            continue;
        }

        println!("\nCategories:");
        for (i, category) in matches.iter().enumerate() {
            println!("[{i}] {}", category.title);
        }

        let choice = input.ask("Select a category number: ", token).await?;
        match choice.trim().parse::<usize>().ok().and_then(|i| matches.get(i)) {
            Some(category) => return Some((*category).clone()),
            None => println!("Invalid choice!"),
        }
    }
}

async fn browse(
    browser: &mut Browser,
    queue: &DownloadQueue,
    input: &mut LineReader,
    token: &CancellationToken,
) {
    loop {
        print_page(browser, queue).await;
        println!("\n(n)ext page, (p)revious page, (f)ilter, (a)ll, (q)uit, or enter number to download:");
        let Some(line) = input.ask("> ", token).await else {
            return;
        };

        match Command::parse(&line) {
            Command::Next => {
                if !browser.next_page() {
                    println!("No more pages.");
                }
            }
            Command::Prev => {
                if !browser.prev_page() {
                    println!("Already at the first page.");
                }
            }
            Command::Filter => {
                print_filter_tips();
                let Some(pattern) = input
                    .ask("Enter filter (supports regex, empty to reset): ", token)
                    .await
                else {
                    return;
                };
                browser.set_filter(pattern.trim());
            }
            Command::QueueAll => queue_all(browser, queue, token).await,
            Command::Quit => return,
            Command::Select(index) => match browser.get(index) {
                Some(item) => queue_one(queue, item).await,
                None => println!("Invalid command or index."),
            },
            Command::Invalid => println!("Invalid command or index."),
        }
    }
}

async fn print_page(browser: &Browser, queue: &DownloadQueue) {
    let page = browser.page_items();
    if page.is_empty() {
        println!("\nNo games found. Use (f) to enter a new filter or (q) to quit.");
        return;
    }

    let listed: Vec<&Item> = page.iter().map(|(_, item)| *item).collect();
    let states = queue.pipeline().states(&listed).await;
    let range = browser.page_range();
    println!(
        "\n--- Page {}/{} ({}-{} of {}) ---",
        browser.page() + 1,
        browser.pages(),
        range.start + 1,
        range.end,
        browser.filtered().len()
    );
    for ((index, item), state) in page.iter().zip(states) {
        let in_flight = queue.tracker().is_in_flight(&item.title);
        match status_tag(state, in_flight) {
            Some(tag) => println!("[{index}] {} ({}) [{tag}]", item.title, item.size_hint),
            None => println!("[{index}] {} ({})", item.title, item.size_hint),
        }
    }
}

fn print_filter_tips() {
    println!("\nRegex filter tips:");
    println!("  - Enter a regex pattern to match titles (e.g. ^Halo.*USA)");
    println!("  - Use | for OR (e.g. Mario|Zelda)");
    println!("  - Use (?i) for case-insensitive (e.g. (?i)halo)");
    println!("  - Leave empty to reset filter");
}

async fn queue_one(queue: &DownloadQueue, item: &Item) {
    match queue.enqueue(item.clone()).await {
        Ok(Enqueued::Queued) => println!("Queued for download: {}", item.title),
        Ok(Enqueued::AlreadyQueued) => println!("Already queued: {}", item.title),
        Ok(Enqueued::AlreadyDownloaded) => println!("Already downloaded: {}", item.title),
        Err(e) => log::error!("Could not queue {}: {e}", item.title),
    }
}

async fn queue_all(browser: &Browser, queue: &DownloadQueue, token: &CancellationToken) {
    let filtered = browser.filtered();
    println!("\nSummary: Attempted to queue {} games.\n", filtered.len());

    let mut queued = 0usize;
    for item in filtered {
        if token.is_cancelled() {
            break;
        }
        match queue.enqueue(item.clone()).await {
            Ok(Enqueued::Queued) => {
                println!("Queued for download: {}", item.title);
                queued += 1;
            }
            Ok(_) => {}
            Err(e) => {
                log::error!("Could not queue {}: {e}", item.title);
                break;
            }
        }
    }

    if queued == 0 {
        println!("No new games to queue for download.");
    } else {
        println!("Queued {queued} new games for download.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<Item> {
        (0..n)
            .map(|i| Item::new(format!("Game {i:03}"), "1 MiB", format!("http://h/{i}.zip")))
            .collect()
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("n"), Command::Next);
        assert_eq!(Command::parse(" P \n"), Command::Prev);
        assert_eq!(Command::parse("F"), Command::Filter);
        assert_eq!(Command::parse("a"), Command::QueueAll);
        assert_eq!(Command::parse("q"), Command::Quit);
        assert_eq!(Command::parse("42"), Command::Select(42));
        assert_eq!(Command::parse("-1"), Command::Invalid);
        assert_eq!(Command::parse("next"), Command::Invalid);
        assert_eq!(Command::parse(""), Command::Invalid);
    }

    #[test]
    fn browser_pages_through_items() {
        let mut browser = Browser::new(items(120), 50);
        assert_eq!(browser.pages(), 3);
        assert_eq!(browser.page_range(), 0..50);
        assert!(!browser.prev_page());

        assert!(browser.next_page());
        assert!(browser.next_page());
        assert_eq!(browser.page_range(), 100..120);
        let page = browser.page_items();
        assert_eq!(page.len(), 20);
        assert_eq!(page[0].0, 100);
        assert_eq!(page[0].1.title, "Game 100");
        assert!(!browser.next_page());
        assert_eq!(browser.page(), 2);
    }

    #[test]
    fn filter_resets_page_and_indexes_filtered_list() {
        let mut browser = Browser::new(items(120), 50);
        browser.next_page();
        browser.set_filter("Game 1[01]");
        assert_eq!(browser.page(), 0);
        assert_eq!(browser.filtered().len(), 20);
        assert_eq!(browser.get(0).map(|i| i.title.as_str()), Some("Game 100"));
        assert_eq!(browser.get(19).map(|i| i.title.as_str()), Some("Game 119"));
        assert!(browser.get(20).is_none());
    }

    #[test]
    fn empty_filter_result_has_no_page() {
        let mut browser = Browser::new(items(3), 50);
        browser.set_filter("Zelda");
        assert!(browser.page_items().is_empty());
        assert_eq!(browser.pages(), 1);
        assert!(!browser.next_page());
    }

    #[test]
    fn category_search_ignores_case() {
        let categories = vec![
            Category {
                title: "Sony - PlayStation 2".into(),
                url: "http://h/ps2/".into(),
            },
            Category {
                title: "Microsoft - Xbox".into(),
                url: "http://h/xbox/".into(),
            },
        ];
        assert_eq!(match_categories(&categories, "").len(), 2);
        let hits = match_categories(&categories, "XBOX");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Microsoft - Xbox");
        assert!(match_categories(&categories, "sega").is_empty());
    }

    #[test]
    fn status_tags() {
        assert_eq!(status_tag(ItemState::Absent, false), None);
        assert_eq!(status_tag(ItemState::Absent, true), Some("queued"));
        assert_eq!(status_tag(ItemState::Partial, false), Some("partial"));
        assert_eq!(status_tag(ItemState::Extracted, false), Some("downloaded"));
    }
}
