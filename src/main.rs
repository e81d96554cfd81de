//! Eaders CLI - browse, read and colorize manga from the terminal.

use anyhow::Context;
use clap::{Parser, Subcommand};
use eaders::catalog::{Book, Catalog, Page, Series, SeriesFilter};
use eaders::colorize::{ColorizeWorkflow, ColorizedView, PageImage};
use eaders::config::Config;
use eaders::console::Console;
use eaders::error::{ColorizeError, Result, SessionError, StoreError};
use eaders::generative::{GeminiClient, GenerativeBackend};
use eaders::images::{ImageFetcher, UpstreamAuth};
use eaders::session::{RatingSummary, Session};
use eaders::store::{ChangeBus, CreditStore, FileStore, Identity, State};
use eaders::synopsis::SynopsisEnhancer;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Manga reader with AI colorization.
#[derive(Parser, Debug)]
#[command(name = "eaders")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List series.
    Series {
        /// Only featured series.
        #[arg(long)]
        featured: bool,

        /// Only series in this genre.
        #[arg(long)]
        genre: Option<String>,
    },

    /// Show one series.
    Show { series: String },

    /// List series grouped by genre.
    Categories,

    /// List the chapters of a series.
    Chapters { series: String },

    /// Read a chapter.
    Read { book: String },

    /// Sign in (defaults to the demo reader).
    Login {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },

    /// Sign out.
    Logout,

    /// Show the signed-in reader.
    Whoami,

    /// Toggle a bookmark.
    Bookmark { series: String },

    /// List bookmarked series.
    Bookmarks,

    /// Rate a series from 1 to 5 stars.
    Rate {
        series: String,
        #[arg(value_parser = clap::value_parser!(u8).range(1..=5))]
        score: u8,
    },

    /// Unlock a premium series.
    Unlock { series: String },

    /// Show (or top up) the credit balance.
    Credits {
        #[arg(long)]
        top_up: bool,
    },

    /// Colorize one page of a chapter.
    Colorize {
        book: String,
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,

        /// Also write the colorized image to this file.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Restore a colorized page to its original.
    Revert {
        book: String,
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
    },

    /// Rewrite a series synopsis with AI.
    Enhance { series: String },

    /// Send feedback about Eaders.
    Feedback { text: String },

    /// Run the image relay server.
    Relay {
        /// Address to bind (defaults to relay.addr from the config).
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
}

/// Everything a command needs.
struct App {
    config: Config,
    catalog: Catalog,
    state: State,
    credits: CreditStore,
    session: Session,
    console: Console,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let state_dir = config.state_dir()?;
        let store = FileStore::open(&state_dir)
            .with_context(|| format!("Failed to open state directory {}", state_dir.display()))?;
        let state = State::new(Arc::new(store), ChangeBus::new());
        let credits = CreditStore::new(state.clone(), config.credits.initial_balance());
        let session = Session::new(
            state.clone(),
            credits.clone(),
            config.credits.top_up_amount(),
        );
        let catalog = Catalog::from_config(&config.catalog).context("Failed to set up catalog")?;

        Ok(Self {
            config,
            catalog,
            state,
            credits,
            session,
            console: Console::new(),
        })
    }

    /// The generative backend, or `None` (with a hint) while unconfigured.
    fn backend(&self) -> Result<Option<Arc<dyn GenerativeBackend>>> {
        if !self.config.generative.is_configured() {
            let config_path = Config::config_path()?;
            self.console.warning(&format!(
                "Generative API key not configured. Please edit: {}",
                config_path.display()
            ));
            return Ok(None);
        }
        let client = GeminiClient::new(self.config.generative.clone())?;
        Ok(Some(Arc::new(client)))
    }

    fn workflow(&self, backend: Arc<dyn GenerativeBackend>) -> Result<ColorizeWorkflow> {
        let images = ImageFetcher::new(&self.config.relay.base_url)?
            .with_auth(UpstreamAuth::from_catalog(&self.config.catalog));
        Ok(ColorizeWorkflow::new(
            self.state.clone(),
            self.credits.clone(),
            self.config.credits.colorize_cost(),
            Arc::new(images),
            backend,
        ))
    }

    async fn require_series(&self, id: &str) -> Result<Option<Series>> {
        let series = self.catalog.get_series(id).await;
        if series.is_none() {
            self.console.error(&format!("Series not found: {}", id));
        }
        Ok(series)
    }

    async fn require_book(&self, id: &str) -> Result<Option<(Book, Series)>> {
        let Some(book) = self.catalog.get_book(id).await else {
            self.console.error(&format!("Chapter not found: {}", id));
            return Ok(None);
        };
        let Some(series) = self.require_series(&book.series_id).await? else {
            return Ok(None);
        };
        Ok(Some((book, series)))
    }

    /// Unwraps a state result, or prints why `action` failed.
    fn stored<T>(&self, action: &str, result: std::result::Result<T, StoreError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.console.error(&format!("Could not {}: {}", action, e));
                None
            }
        }
    }

    /// Reports a locked premium series and returns false.
    fn check_readable(&self, series: &Series) -> bool {
        match self.stored("check unlocks", self.session.can_read(series)) {
            Some(true) => return true,
            Some(false) => {}
            None => return false,
        }
        self.console.notice(
            "Chapter Locked",
            &format!(
                "{} is a premium series. Run `eaders unlock {}` to read it.",
                series.title(),
                series.id
            ),
        );
        false
    }

    /// Ratings for display. Unreadable local ratings show the series' own.
    fn rating_summary(&self, series: &Series) -> RatingSummary {
        self.session.rating_summary(series).unwrap_or_else(|e| {
            tracing::warn!(series = %series.id, error = %e, "could not read ratings");
            RatingSummary {
                average: series.average_rating,
                count: series.rating_count,
                your_rating: None,
            }
        })
    }

    fn print_series_line(&self, series: &Series) {
        let summary = self.rating_summary(series);
        let mut line = format!(
            "{}  {}  {}",
            self.console.muted(&series.id),
            series.title(),
            self.console.stars(summary.average, summary.count)
        );
        if series.premium {
            line.push_str(&format!("  {}", self.console.premium_badge()));
        }
        println!("{}", line);
    }

    /// Prints the notice for a failed session action.
    fn session_failure(&self, error: SessionError, action: &str) {
        match error {
            SessionError::AuthRequired => {
                self.console
                    .notice("Login Required", &format!("Please log in to {}.", action));
            }
            SessionError::InvalidScore(score) => {
                self.console
                    .error(&format!("Rating must be 1 to 5 stars, got {}", score));
            }
            SessionError::EmptyFeedback => {
                self.console.notice(
                    "Empty Feedback",
                    "Please write your feedback before submitting.",
                );
            }
            SessionError::Storage(e) => {
                self.stored::<()>(action, Err(e));
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = match args.command {
        Command::Relay { .. } => "info",
        _ => "warn",
    };
    eaders::logging::init(default_filter)?;

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let app = App::new(config)?;
    run(&app, args.command).await
}

async fn run(app: &App, command: Command) -> Result<()> {
    let console = &app.console;

    match command {
        Command::Series { featured, genre } => {
            let filter = SeriesFilter { featured, genre };
            let series = app.catalog.list_series(&filter).await;
            if series.is_empty() {
                console.info("No series found");
            }
            for s in &series {
                app.print_series_line(s);
            }
        }

        Command::Show { series } => {
            let Some(series) = app.require_series(&series).await? else {
                return Ok(());
            };
            show_series(app, &series);
        }

        Command::Categories => {
            for (genre, series) in app.catalog.categories().await {
                console.section(&genre);
                for s in &series {
                    app.print_series_line(s);
                }
            }
        }

        Command::Chapters { series } => {
            let Some(series) = app.require_series(&series).await? else {
                return Ok(());
            };
            console.section(series.title());
            if app.stored("check unlocks", app.session.can_read(&series)) == Some(false) {
                console.warning("Premium series: unlock it to read these chapters");
            }
            for book in app.catalog.list_books(&series.id).await {
                println!(
                    "{:>4}  {}  {}",
                    book.number,
                    book.name,
                    console.muted(&format!("{} ({} pages)", book.id, book.pages_count))
                );
            }
        }

        Command::Read { book } => {
            let Some((book, series)) = app.require_book(&book).await? else {
                return Ok(());
            };
            if !app.check_readable(&series) {
                return Ok(());
            }
            read_book(app, &book, &series).await;
        }

        Command::Login { id, name, email } => {
            let demo = Identity::demo();
            let identity = Identity {
                id: id.unwrap_or(demo.id),
                name: name.unwrap_or(demo.name),
                email: email.unwrap_or(demo.email),
                image_url: demo.image_url,
            };
            let name = identity.name.clone();
            if app.stored("sign in", app.session.login(identity)).is_some() {
                console.notice("Logged In", &format!("Welcome, {}!", name));
            }
        }

        Command::Logout => {
            if app.stored("sign out", app.session.logout()).is_some() {
                console.notice("Logged Out", "");
            }
        }

        Command::Whoami => match app.stored("read the signed-in reader", app.session.identity()) {
            Some(Some(identity)) => println!(
                "{} {} <{}> {}",
                console.label(&identity.initials(), eaders::console::Style::Cyan),
                identity.name,
                identity.email,
                console.muted(&identity.id)
            ),
            Some(None) => console.info("Not logged in"),
            None => {}
        },

        Command::Bookmark { series } => {
            let Some(series) = app.require_series(&series).await? else {
                return Ok(());
            };
            match app.session.toggle_bookmark(&series.id) {
                Ok(true) => console.notice(
                    "Bookmarked!",
                    &format!("{} has been added to your bookmarks.", series.title()),
                ),
                Ok(false) => console.notice(
                    "Bookmark Removed",
                    &format!("{} has been removed from your bookmarks.", series.title()),
                ),
                Err(e) => app.session_failure(e, "bookmark manga"),
            }
        }

        Command::Bookmarks => match app.session.bookmarked_series(&app.catalog).await {
            Ok(series) if series.is_empty() => console.info("No bookmarks yet"),
            Ok(series) => {
                for s in &series {
                    app.print_series_line(s);
                }
            }
            Err(e) => app.session_failure(e, "see your bookmarks"),
        },

        Command::Rate { series, score } => {
            let Some(series) = app.require_series(&series).await? else {
                return Ok(());
            };
            match app.session.rate(&series.id, score) {
                Ok(entry) => console.notice(
                    "Rating Submitted!",
                    &format!(
                        "You rated {} {} stars. New average {:.1} from {} ratings.",
                        series.title(),
                        score,
                        entry.average(),
                        entry.count
                    ),
                ),
                Err(e) => app.session_failure(e, "rate manga"),
            }
        }

        Command::Unlock { series } => {
            let Some(series) = app.require_series(&series).await? else {
                return Ok(());
            };
            if !series.premium {
                console.info(&format!("{} is free to read", series.title()));
                return Ok(());
            }
            if app.stored("unlock the series", app.session.unlock(&series.id)).is_some() {
                console.notice(
                    "Series Unlocked!",
                    &format!("You can now read all chapters of {}.", series.title()),
                );
            }
        }

        Command::Credits { top_up } => {
            if top_up {
                if let Some(balance) = app.stored("add credit", app.session.top_up()) {
                    console.notice(
                        "Credit Added",
                        &format!("Balance is now {}", console.credits(balance)),
                    );
                }
            } else if let Some(balance) = app.stored("read the balance", app.session.balance()) {
                println!("Balance: {}", console.credits(balance));
            }
        }

        Command::Colorize { book, page, output } => {
            colorize_page(app, &book, page, output).await?;
        }

        Command::Revert { book, page } => {
            let view = ColorizedView::new(app.state.clone());
            if app.stored("revert the page", view.revert(&book, page)).is_some() {
                console.notice("Page Reverted", &format!("Page {} shows the original.", page));
            }
        }

        Command::Enhance { series } => {
            let Some(series) = app.require_series(&series).await? else {
                return Ok(());
            };
            let Some(backend) = app.backend()? else {
                return Ok(());
            };
            let enhancer = SynopsisEnhancer::new(backend);
            match enhancer
                .enhance(series.title(), &series.metadata.summary)
                .await
            {
                Ok(text) => {
                    console.section(&format!("{} (enhanced)", series.title()));
                    println!("{}", text);
                }
                Err(e) => console.error(&format!("Could not enhance synopsis: {}", e)),
            }
        }

        Command::Feedback { text } => match app.session.submit_feedback(&text) {
            Ok(_) => console.notice(
                "Feedback Submitted!",
                "Thanks for helping us improve Eaders.",
            ),
            Err(e) => app.session_failure(e, "send feedback"),
        },

        Command::Relay { addr } => {
            let addr = match addr {
                Some(addr) => addr,
                None => app
                    .config
                    .relay
                    .addr
                    .parse()
                    .with_context(|| format!("Invalid relay.addr: {}", app.config.relay.addr))?,
            };
            eaders::relay::serve(addr, UpstreamAuth::from_catalog(&app.config.catalog)).await?;
        }
    }

    Ok(())
}

fn show_series(app: &App, series: &Series) {
    let console = &app.console;
    let summary = app.rating_summary(series);

    console.section(series.title());
    println!("{}", console.muted(&series.id));
    println!("Author:   {}", series.author_names());
    println!("Status:   {}", series.metadata.status);
    println!("Genres:   {}", series.metadata.genres.join(", "));
    println!("Chapters: {}", series.books_count);
    println!("Rating:   {}", console.stars(summary.average, summary.count));
    if let Some(yours) = summary.your_rating {
        println!("Yours:    {} stars", yours);
    }
    if series.premium {
        let state = match app.stored("check unlocks", app.session.is_unlocked(&series.id)) {
            Some(true) => "unlocked",
            Some(false) => "locked",
            None => "unknown",
        };
        println!("{}  {}", console.premium_badge(), state);
    }
    if app.stored("read bookmarks", app.session.is_bookmarked(&series.id)) == Some(true) {
        println!("{}", console.muted("Bookmarked"));
    }
    println!();
    println!("{}", series.metadata.summary);
}

async fn read_book(app: &App, book: &Book, series: &Series) {
    let console = &app.console;
    console.section(&format!("{} - {}", series.title(), book.name));

    let pages = app.catalog.list_pages(&book.id).await;
    let view = ColorizedView::new(app.state.clone());
    for page in &pages {
        let shown = view.page_view(&book.id, page).unwrap_or_else(|e| {
            tracing::warn!(book = %book.id, page = page.number, error = %e, "could not read colorized pages");
            PageImage::Original(page.url.clone())
        });
        let line = match shown {
            PageImage::Original(url) => url,
            PageImage::Colorizing => console.muted("colorizing..."),
            PageImage::Colorized(image) => format!(
                "{} {}",
                console.label("COLOR", eaders::console::Style::Green),
                console.muted(&format!("{} bytes inline", image.len()))
            ),
        };
        println!("{:>4}  {}", page.number, line);
    }

    let (prev, next) = app.catalog.neighbours(book).await;
    println!();
    if let Some(prev) = prev {
        println!("Previous: {} {}", prev.name, console.muted(&prev.id));
    }
    if let Some(next) = next {
        println!("Next:     {} {}", next.name, console.muted(&next.id));
    }
}

async fn colorize_page(app: &App, book_id: &str, number: u32, output: Option<PathBuf>) -> Result<()> {
    let console = &app.console;
    let Some((book, series)) = app.require_book(book_id).await? else {
        return Ok(());
    };
    if !app.check_readable(&series) {
        return Ok(());
    }
    let pages = app.catalog.list_pages(&book.id).await;
    let Some(page) = pages.iter().find(|p| p.number == number) else {
        console.error(&format!(
            "Page {} not found ({} has {} pages)",
            number,
            book.name,
            pages.len()
        ));
        return Ok(());
    };
    let Some(backend) = app.backend()? else {
        return Ok(());
    };
    let workflow = app.workflow(backend)?;

    console.info(&format!(
        "Colorizing page {} for {} credit...",
        number,
        console.credits(workflow.cost())
    ));
    match workflow.colorize(&book.id, page).await {
        Ok(image) => {
            match app.session.balance() {
                Ok(balance) => console.notice(
                    "Page Colorized",
                    &format!("Balance is now {}", console.credits(balance)),
                ),
                Err(_) => console.notice("Page Colorized", ""),
            }
            if let Some(path) = output {
                write_image(&path, &image, page)?;
                console.success(&format!("Saved to {}", path.display()));
            }
        }
        Err(e) => report_colorize_failure(console, e),
    }
    Ok(())
}

fn write_image(path: &std::path::Path, image: &eaders::DataUri, page: &Page) -> Result<()> {
    let bytes = image
        .decode()
        .with_context(|| format!("Colorized page {} is not valid base64", page.number))?;
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn report_colorize_failure(console: &Console, error: ColorizeError) {
    if error.is_safety_blocked() {
        console.notice(
            "Colorization Blocked",
            "The page could not be colorized due to safety filters. No credit was used.",
        );
        return;
    }
    match error {
        ColorizeError::AuthRequired => {
            console.notice("Login Required", "Please log in to colorize pages.");
        }
        ColorizeError::InsufficientCredit { balance, cost } => console.notice(
            "Insufficient Credit",
            &format!(
                "Colorizing costs {} and your balance is {}. Run `eaders credits --top-up`.",
                cost, balance
            ),
        ),
        ColorizeError::AlreadyInProgress { page } => {
            console.warning(&format!("Page {} is already being colorized", page));
        }
        ColorizeError::CacheWrite(e) => console.error(&format!(
            "The page was colorized and its credit was spent, but it could not be saved: {}",
            e
        )),
        other => console.error(&format!("{}. No credit was used.", other)),
    }
}
