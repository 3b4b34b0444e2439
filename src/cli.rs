use crate::activity::ActivityLog;
use crate::api::DonorApi;
use crate::auth::AuthStore;
use crate::config::Config;
use crate::donors::DonorBrowser;
use crate::map::MapView;
use crate::model::{BloodGroup, DonorFilters};
use crate::profile::{self, ProfileEditor, ProfileError};
use crate::registration::{RegistrationWizard, SubmitError, REGISTER_FAILED};
use crate::storage::Storage;
use crate::{render, validation};
use anyhow::{anyhow, bail, Context as _, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::rc::Rc;

const BLOOD_GROUP_PROMPT: &str = "Blood group (A+ A- B+ B- AB+ AB- O+ O-)";
const DONATION_DATE_PROMPT: &str = "Last donation date YYYY-MM-DD (optional)";

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account, optionally as a blood donor
    Register,
    /// Forget the stored session
    Logout,
    /// Show who is signed in
    Whoami,
    /// Show your profile, or another donor's by id
    Profile { id: Option<String> },
    /// Edit your profile or become a donor
    Edit,
    /// Browse or search donors
    Donors(SearchArgs),
    /// Show one donor's card
    Donor { id: String },
    /// Show donors on a map
    Map(MapArgs),
    /// Donor totals by availability, location and blood group
    Stats,
}

#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct SearchArgs {
    #[arg(long, value_name = "GROUP")]
    pub blood_group: Option<BloodGroup>,
    #[arg(long)]
    pub city: Option<String>,
    /// Shorthand filters: a blood group and/or a city, e.g. `O- Chicago`
    #[arg(value_name = "TERMS")]
    pub terms: Vec<String>,
}

impl SearchArgs {
    pub fn filters(&self) -> DonorFilters {
        let mut blood_group = self.blood_group;
        let mut rest: &[String] = &self.terms;
        if blood_group.is_none() {
            if let Some(group) = rest.first().and_then(|t| t.parse::<BloodGroup>().ok()) {
                blood_group = Some(group);
                rest = &rest[1..];
            }
        }
        let joined = rest.join(" ");
        let city = self.city.as_deref().unwrap_or(&joined);
        DonorFilters::new(blood_group, Some(city))
    }
}

#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct MapArgs {
    #[command(flatten)]
    pub search: SearchArgs,
    /// Centre the map on your position
    #[arg(long, value_name = "LAT,LON", allow_hyphen_values = true)]
    pub at: Option<String>,
    /// Write the shown markers as GeoJSON
    #[arg(long, value_name = "PATH")]
    pub geojson: Option<PathBuf>,
    /// Clear filters and return to the default view
    #[arg(long)]
    pub reset: bool,
}

#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct ReplLine {
    #[command(subcommand)]
    command: Command,
}

/// Line input for the REPL and interactive forms.
pub trait Input {
    /// Read a command line; `None` on end of input.
    fn line(&mut self, prompt: &str) -> Result<Option<String>>;
    /// Read a form value pre-filled with `initial`; kept out of history.
    fn ask(&mut self, prompt: &str, initial: &str) -> Result<Option<String>>;
    /// Read a value without echoing it.
    fn secret(&mut self, prompt: &str) -> Result<Option<String>>;
}

pub struct EditorInput {
    rl: DefaultEditor,
}

impl EditorInput {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rl: DefaultEditor::new()?,
        })
    }
}

impl Input for EditorInput {
    fn line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.rl.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.rl.add_history_entry(line.trim())?;
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn ask(&mut self, prompt: &str, initial: &str) -> Result<Option<String>> {
        match self.rl.readline_with_initial(prompt, (initial, "")) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn secret(&mut self, prompt: &str) -> Result<Option<String>> {
        match rpassword::prompt_password(prompt) {
            Ok(value) => Ok(Some(value)),
            Err(e) if matches!(e.kind(), ErrorKind::UnexpectedEof | ErrorKind::Interrupted) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub struct Context {
    pub config: Config,
    pub api: Rc<dyn DonorApi>,
    pub auth: RefCell<AuthStore>,
    pub browser: RefCell<DonorBrowser>,
    pub map: RefCell<MapView>,
    pub activity: RefCell<Option<ActivityLog>>,
    pub banner: RefCell<Option<String>>,
    pub input: RefCell<Box<dyn Input>>,
}

impl Context {
    pub fn new(
        config: Config,
        api: Rc<dyn DonorApi>,
        storage: Rc<dyn Storage>,
        input: Box<dyn Input>,
    ) -> Self {
        let auth = AuthStore::new(api.clone(), storage);
        Self {
            config,
            api,
            auth: RefCell::new(auth),
            browser: RefCell::new(DonorBrowser::new()),
            map: RefCell::new(MapView::new()),
            activity: RefCell::new(None),
            banner: RefCell::new(None),
            input: RefCell::new(input),
        }
    }

    pub fn with_activity(self, log: ActivityLog) -> Self {
        *self.activity.borrow_mut() = Some(log);
        self
    }

    fn record(&self, write: impl FnOnce(&mut ActivityLog) -> Result<()>) {
        if let Some(log) = self.activity.borrow_mut().as_mut() {
            if let Err(e) = write(log) {
                tracing::warn!(error = %e, "failed to write activity log");
            }
        }
    }

    fn fallback(&self) -> bool {
        self.config.donors.fallback
    }

    /// Show an error line; it stays current until the next command or `/dismiss`.
    fn show_banner(&self, message: &str) {
        println!("{}", render::banner(message));
        *self.banner.borrow_mut() = Some(message.to_string());
    }

    fn dismiss(&self) {
        self.banner.borrow_mut().take();
        self.auth.borrow_mut().clear_error();
        self.browser.borrow_mut().dismiss_error();
        self.map.borrow_mut().dismiss_error();
    }

    /// Notice a server-side logout (401) that happened during `command`.
    fn after_request(&self, command: &str) {
        let mut auth = self.auth.borrow_mut();
        let was_signed_in = auth.is_authenticated();
        auth.sync_with_storage();
        if was_signed_in && !auth.is_authenticated() {
            drop(auth);
            self.show_banner("Your session has expired. Please log in again.");
            self.record(|log| log.unauthorized(command));
        }
    }

    fn require_login(&self, command: &str) -> Result<()> {
        if self.auth.borrow().is_authenticated() {
            return Ok(());
        }
        self.record(|log| log.unauthorized(command));
        bail!("Please log in to use '{}' (try: login)", command)
    }

    fn ask(&self, label: &str, initial: &str) -> Result<String> {
        self.input
            .borrow_mut()
            .ask(&format!("{}: ", label), initial)?
            .ok_or_else(|| anyhow!("Cancelled"))
    }

    fn secret(&self, label: &str) -> Result<String> {
        self.input
            .borrow_mut()
            .secret(&format!("{}: ", label))?
            .ok_or_else(|| anyhow!("Cancelled"))
    }

    fn confirm(&self, label: &str, default: bool) -> Result<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        let answer = self.ask(&format!("{} [{}]", label, hint), "")?;
        Ok(match answer.trim().to_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        })
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Validate a stored session before the first command.
pub fn restore_session(ctx: &Context) {
    ctx.auth.borrow_mut().restore();
    if let Some(user) = ctx.auth.borrow().user() {
        tracing::info!(user = %user.email, "signed in from stored session");
    }
}

pub fn run_once(ctx: &Context, command: Command) -> Result<()> {
    restore_session(ctx);
    dispatch(ctx, command)
}

pub fn run_repl(ctx: &Context) -> Result<()> {
    restore_session(ctx);
    println!("donorlink - type /help for commands, /exit to quit");
    if let Some(user) = ctx.auth.borrow().user() {
        println!("Signed in as {}", render::user_summary(user));
    }

    loop {
        let line = ctx.input.borrow_mut().line(">>> ")?;
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if handle_line(ctx, line) {
            break;
        }
    }

    Ok(())
}

/// Returns true when the REPL should exit.
fn handle_line(ctx: &Context, line: &str) -> bool {
    let Some(rest) = line.strip_prefix('/') else {
        println!("Commands start with '/'. Type /help for the list.");
        return false;
    };

    match rest.split_whitespace().next().unwrap_or("") {
        "exit" | "quit" => return true,
        "help" => {
            print_help();
            return false;
        }
        "dismiss" => {
            ctx.dismiss();
            return false;
        }
        _ => {}
    }

    let command = match parse_repl_line(rest) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            return false;
        }
    };
    if let Err(e) = dispatch(ctx, command) {
        eprintln!("Error: {}", e);
    }
    false
}

fn parse_repl_line(line: &str) -> Result<Command> {
    let words = shell_words::split(line).context("Unbalanced quotes")?;
    let parsed = ReplLine::try_parse_from(words).map_err(|e| anyhow!(e.render().to_string()))?;
    Ok(parsed.command)
}

fn print_help() {
    println!("Account:");
    println!("  /login [--email E]       - sign in");
    println!("  /register                - create an account");
    println!("  /logout                  - sign out");
    println!("  /whoami                  - show the signed-in user");
    println!("  /profile [id]            - show your profile or a donor's");
    println!("  /edit                    - edit your profile or become a donor");
    println!("Donors:");
    println!("  /donors [GROUP] [CITY]   - list donors, e.g. /donors O- Chicago");
    println!("  /donor <id>              - show one donor");
    println!("  /stats                   - donor totals");
    println!("  /map [GROUP] [CITY] [--at LAT,LON] [--geojson PATH] [--reset]");
    println!("Other:");
    println!("  /dismiss                 - clear the current error");
    println!("  /help                    - show commands");
    println!("  /exit                    - quit");
}

pub fn dispatch(ctx: &Context, command: Command) -> Result<()> {
    ctx.banner.borrow_mut().take();
    match command {
        Command::Login { email } => login(ctx, email),
        Command::Register => register(ctx),
        Command::Logout => {
            ctx.auth.borrow_mut().logout();
            ctx.record(|log| log.logout());
            println!("Signed out");
            Ok(())
        }
        Command::Whoami => {
            match ctx.auth.borrow().user() {
                Some(user) => println!("{}", render::user_summary(user)),
                None => println!("Not signed in"),
            }
            Ok(())
        }
        Command::Profile { id } => show_profile(ctx, id.as_deref()),
        Command::Edit => edit_profile(ctx),
        Command::Donors(search) => list_donors(ctx, search.filters()),
        Command::Donor { id } => show_profile(ctx, Some(&id)),
        Command::Map(args) => show_map(ctx, &args),
        Command::Stats => show_stats(ctx),
    }
}

fn login(ctx: &Context, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => ctx.ask("Email", "")?,
    };
    let password = ctx.secret("Password")?;

    if let Err(errors) = validation::validate_login(&email, &password) {
        println!("{}", render::field_errors(&errors));
        bail!("Login details are incomplete");
    }

    let result = ctx.auth.borrow_mut().login(email.trim(), &password);
    ctx.record(|log| log.login(email.trim(), result.is_ok()));
    match result {
        Ok(user) => {
            println!("Welcome back, {}", user.full_name());
            Ok(())
        }
        Err(_) => {
            let message = ctx.auth.borrow().state().error.clone().unwrap_or_default();
            ctx.show_banner(&message);
            bail!("Login failed")
        }
    }
}

fn register(ctx: &Context) -> Result<()> {
    let mut wizard = RegistrationWizard::new();
    loop {
        println!(
            "Step {} of {}: {}",
            wizard.step() + 1,
            wizard.steps().len(),
            wizard.current_label()
        );
        match wizard.step() {
            0 => {
                let f = wizard.form_mut();
                f.email = ctx.ask("Email", &f.email)?;
                f.password = ctx.secret("Password")?;
                f.confirm_password = ctx.secret("Confirm password")?;
            }
            1 => {
                let f = wizard.form_mut();
                f.first_name = ctx.ask("First name", &f.first_name)?;
                f.last_name = ctx.ask("Last name", &f.last_name)?;
                f.phone_number = ctx.ask("Phone number", &f.phone_number)?;
                f.city = ctx.ask("City", &f.city)?;
                let is_donor = ctx.confirm("Register as a blood donor?", f.is_donor)?;
                wizard.set_donor(is_donor);
            }
            _ => {
                if wizard.form().is_donor {
                    let f = wizard.form_mut();
                    f.blood_group = ctx.ask(BLOOD_GROUP_PROMPT, &f.blood_group)?;
                    f.last_donation_date = ctx.ask(DONATION_DATE_PROMPT, &f.last_donation_date)?;
                    f.available_for_donation = ctx.confirm("Available to donate now?", false)?;
                    f.consent_to_contact = ctx.confirm("May people in need contact you?", false)?;
                }
                if !ctx.confirm("Create account?", true)? {
                    wizard.back();
                    continue;
                }
                let result = wizard.submit(&mut ctx.auth.borrow_mut());
                let email = wizard.form().email.trim().to_string();
                let is_donor = wizard.form().is_donor;
                match result {
                    Ok(user) => {
                        ctx.record(|log| log.register(&email, is_donor, true));
                        println!("Welcome, {}! Your account is ready.", user.full_name());
                        return Ok(());
                    }
                    Err(SubmitError::Invalid(errors)) => {
                        println!("{}", render::field_errors(&errors));
                        continue;
                    }
                    Err(SubmitError::Api(_)) => {
                        ctx.record(|log| log.register(&email, is_donor, false));
                        ctx.show_banner(wizard.error().unwrap_or(REGISTER_FAILED));
                        bail!("Registration failed");
                    }
                    Err(e @ SubmitError::Incomplete) => return Err(e.into()),
                }
            }
        }
        if !wizard.next() {
            println!("{}", render::field_errors(wizard.errors()));
        }
    }
}

fn load_editor(ctx: &Context) -> Result<ProfileEditor> {
    let loaded = ProfileEditor::load(ctx.api.as_ref());
    ctx.after_request("profile");
    loaded.map_err(|_| {
        ctx.show_banner(profile::LOAD_FAILED);
        anyhow!("Profile not found")
    })
}

fn show_profile(ctx: &Context, id: Option<&str>) -> Result<()> {
    ctx.require_login("profile")?;
    if profile::is_own_profile(&ctx.auth.borrow(), id) {
        let editor = load_editor(ctx)?;
        println!("{}", render::profile(editor.saved()));
        return Ok(());
    }

    let id = id.unwrap_or_default();
    let result = profile::donor_details(ctx.api.as_ref(), &ctx.auth.borrow(), id);
    ctx.after_request("donor");
    match result {
        Ok(donor) => {
            println!("{}", render::donor_card(&donor, today()));
            Ok(())
        }
        Err(e) => {
            ctx.show_banner(&e.banner(profile::LOAD_FAILED));
            bail!("Profile not found")
        }
    }
}

fn ask_blood_group(ctx: &Context, current: Option<BloodGroup>) -> Result<BloodGroup> {
    let initial = current.map(|g| g.as_str()).unwrap_or("A+");
    loop {
        let answer = ctx.ask(BLOOD_GROUP_PROMPT, initial)?;
        match validation::blood_group(&answer) {
            Ok(group) => return Ok(group),
            Err(message) => println!("  bloodGroup: {}", message),
        }
    }
}

fn ask_donation_date(ctx: &Context, current: Option<NaiveDate>) -> Result<Option<NaiveDate>> {
    let initial = current.map(|d| d.to_string()).unwrap_or_default();
    loop {
        let answer = ctx.ask(DONATION_DATE_PROMPT, &initial)?;
        match validation::last_donation_date(&answer) {
            Ok(date) => return Ok(date),
            Err(message) => println!("  lastDonationDate: {}", message),
        }
    }
}

fn edit_profile(ctx: &Context) -> Result<()> {
    ctx.require_login("edit")?;
    let mut editor = load_editor(ctx)?;

    {
        let f = editor.form_mut();
        f.first_name = ctx.ask("First name", &f.first_name)?;
        f.last_name = ctx.ask("Last name", &f.last_name)?;
        f.phone_number = ctx.ask("Phone number", &f.phone_number)?;
        f.city = ctx.ask("City", &f.city)?;
    }

    if !editor.form().is_donor && ctx.confirm("Become a blood donor?", false)? {
        editor.form_mut().become_donor();
    }
    if editor.form().is_donor {
        let f = editor.form_mut();
        f.blood_group = Some(ask_blood_group(ctx, f.blood_group)?);
        f.last_donation_date = ask_donation_date(ctx, f.last_donation_date)?;
        f.available_for_donation =
            ctx.confirm("Available to donate now?", f.available_for_donation)?;
        f.consent_to_contact =
            ctx.confirm("May people in need contact you?", f.consent_to_contact)?;
    }

    if !ctx.confirm("Save changes?", true)? {
        editor.discard();
        println!("No changes saved");
        return Ok(());
    }

    let result = editor.save(&mut ctx.auth.borrow_mut());
    ctx.after_request("edit");
    let is_donor = editor.form().is_donor;
    match result {
        Ok(()) => {
            ctx.record(|log| log.profile_update(is_donor, true));
            println!("{}", render::notice(editor.notice().unwrap_or(profile::UPDATED)));
            println!("{}", render::profile(editor.saved()));
            Ok(())
        }
        Err(ProfileError::Invalid(errors)) => {
            println!("{}", render::field_errors(&errors));
            bail!("Profile not saved")
        }
        Err(ProfileError::Api(_)) => {
            ctx.record(|log| log.profile_update(is_donor, false));
            ctx.show_banner(editor.error().unwrap_or(profile::UPDATE_FAILED));
            bail!("Profile not saved")
        }
    }
}

/// Unfiltered listings reuse the first load; filtered ones always hit the API.
fn list_donors(ctx: &Context, filters: DonorFilters) -> Result<()> {
    let mut browser = ctx.browser.borrow_mut();
    if filters.is_empty() {
        if browser.is_loaded() {
            browser.clear();
        } else {
            println!("Loading donors...");
            browser.load(ctx.api.as_ref(), ctx.fallback());
        }
    } else {
        println!("Searching donors...");
        browser.search(ctx.api.as_ref(), filters, ctx.fallback());
    }
    ctx.after_request("donors");

    if let Some(error) = browser.error() {
        ctx.show_banner(error);
        browser.dismiss_error();
    }
    if let Some(source) = browser.source() {
        let count = browser.shown().len();
        ctx.record(|log| log.donor_search(browser.filters(), source, count));
    }
    println!("{}", render::donor_list(browser.shown(), browser.source(), today()));
    Ok(())
}

fn show_stats(ctx: &Context) -> Result<()> {
    let mut browser = ctx.browser.borrow_mut();
    if !browser.is_loaded() {
        browser.load(ctx.api.as_ref(), ctx.fallback());
        ctx.after_request("stats");
    }
    if let Some(error) = browser.error() {
        ctx.show_banner(error);
        browser.dismiss_error();
    }
    println!("{}", render::stats(browser.stats()));
    Ok(())
}

fn show_map(ctx: &Context, args: &MapArgs) -> Result<()> {
    let mut view = ctx.map.borrow_mut();
    if !view.is_loaded() {
        println!("Loading donor map...");
        view.load(ctx.api.as_ref(), ctx.fallback());
        ctx.after_request("map");
    }
    if args.reset {
        view.reset();
    }
    let filters = args.search.filters();
    if !filters.is_empty() {
        view.apply_filters(filters);
    }
    if let Some(at) = &args.at {
        view.use_location(at);
    }
    if let Some(error) = view.error() {
        ctx.show_banner(error);
        view.dismiss_error();
    }

    println!(
        "{}",
        render::map_view(&view, ctx.config.map.plot_width, ctx.config.map.plot_height)
    );

    if let Some(path) = &args.geojson {
        let doc = serde_json::to_string_pretty(&view.geojson())?;
        std::fs::write(path, doc).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {} marker(s) to {}", view.markers().len(), path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;
    use crate::api::ApiError;
    use crate::model::{LoginResponse, User};
    use crate::storage::{self, MemoryStorage};
    use std::collections::VecDeque;
    use tempfile::TempDir;

    #[derive(Default)]
    struct ScriptedInput {
        answers: VecDeque<&'static str>,
        /// Prompts that were read without echo.
        hidden: Rc<RefCell<Vec<String>>>,
    }

    impl ScriptedInput {
        fn new(answers: &[&'static str]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl Input for ScriptedInput {
        fn line(&mut self, _prompt: &str) -> Result<Option<String>> {
            Ok(self.answers.pop_front().map(String::from))
        }

        fn ask(&mut self, _prompt: &str, _initial: &str) -> Result<Option<String>> {
            Ok(self.answers.pop_front().map(String::from))
        }

        fn secret(&mut self, prompt: &str) -> Result<Option<String>> {
            self.hidden.borrow_mut().push(prompt.to_string());
            Ok(self.answers.pop_front().map(String::from))
        }
    }

    fn user() -> User {
        User {
            id: "u-1".to_string(),
            first_name: "Ada".to_string(),
            last_name: "King".to_string(),
            email: "ada@example.com".to_string(),
            phone_number: "555-123-4567".to_string(),
            city: "London".to_string(),
            is_donor: false,
            donor: None,
        }
    }

    fn signed_in_api() -> MockApi {
        MockApi {
            login_result: Some(Ok(LoginResponse {
                token: "tok".to_string(),
                user: user(),
            })),
            profile_result: Some(Ok(user())),
            ..Default::default()
        }
    }

    fn context(
        api: MockApi,
        answers: &[&'static str],
    ) -> (Context, Rc<MockApi>, Rc<MemoryStorage>) {
        let api = Rc::new(api);
        let storage = Rc::new(MemoryStorage::default());
        let input = ScriptedInput::new(answers);
        let ctx = Context::new(Config::default(), api.clone(), storage.clone(), Box::new(input));
        (ctx, api, storage)
    }

    fn events(ctx: &Context) -> Vec<serde_json::Value> {
        let path = ctx.activity.borrow().as_ref().unwrap().path.clone();
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_repl_shorthand() {
        let command = parse_repl_line("donors O- Chicago").unwrap();
        let Command::Donors(search) = command else {
            panic!("expected donors, got {:?}", command);
        };
        let filters = search.filters();
        assert_eq!(filters.blood_group, Some(BloodGroup::ONeg));
        assert_eq!(filters.location.as_deref(), Some("Chicago"));
    }

    #[test]
    fn test_parse_repl_flags_and_quotes() {
        let command = parse_repl_line("donors --city \"New York\"").unwrap();
        let Command::Donors(search) = command else {
            panic!("expected donors");
        };
        assert_eq!(search.filters().location.as_deref(), Some("New York"));
        assert_eq!(search.filters().blood_group, None);

        let command = parse_repl_line("map --at 40.7,-74.0 --reset").unwrap();
        let Command::Map(args) = command else {
            panic!("expected map");
        };
        assert_eq!(args.at.as_deref(), Some("40.7,-74.0"));
        assert!(args.reset);
    }

    #[test]
    fn test_parse_repl_rejects_unknown() {
        assert!(parse_repl_line("teleport").is_err());
        assert!(parse_repl_line("donors --blood-group Z").is_err());
    }

    #[test]
    fn test_search_terms_without_group_are_a_city() {
        let search = SearchArgs {
            terms: vec!["New".to_string(), "York".to_string()],
            ..Default::default()
        };
        let filters = search.filters();
        assert_eq!(filters.blood_group, None);
        assert_eq!(filters.location.as_deref(), Some("New York"));
        assert!(SearchArgs::default().filters().is_empty());
    }

    #[test]
    fn test_login_records_activity() {
        let dir = TempDir::new().unwrap();
        let (ctx, _, storage) = context(signed_in_api(), &["password1"]);
        let ctx = ctx.with_activity(ActivityLog::create(dir.path()).unwrap());

        dispatch(
            &ctx,
            Command::Login {
                email: Some("ada@example.com".to_string()),
            },
        )
        .unwrap();
        assert!(ctx.auth.borrow().is_authenticated());
        assert_eq!(storage::token(storage.as_ref()).as_deref(), Some("tok"));

        let events = events(&ctx);
        assert_eq!(events[0]["type"], "login");
        assert_eq!(events[0]["ok"], true);
    }

    #[test]
    fn test_passwords_are_read_without_echo() {
        let input = ScriptedInput::new(&[
            "ada@example.com",
            "password1",
            "password1",
            "Ada",
            "King",
            "555-123-4567",
            "London",
            "n",
            "y",
        ]);
        let hidden = input.hidden.clone();
        let api = Rc::new(signed_in_api());
        let storage = Rc::new(MemoryStorage::default());
        let ctx = Context::new(Config::default(), api, storage, Box::new(input));

        dispatch(&ctx, Command::Register).unwrap();
        assert_eq!(*hidden.borrow(), vec!["Password: ", "Confirm password: "]);
        assert!(ctx.auth.borrow().is_authenticated());
    }

    #[test]
    fn test_login_password_is_read_without_echo() {
        let input = ScriptedInput::new(&["ada@example.com", "password1"]);
        let hidden = input.hidden.clone();
        let storage = Rc::new(MemoryStorage::default());
        let ctx = Context::new(
            Config::default(),
            Rc::new(signed_in_api()),
            storage,
            Box::new(input),
        );

        dispatch(&ctx, Command::Login { email: None }).unwrap();
        assert_eq!(*hidden.borrow(), vec!["Password: "]);
    }

    #[test]
    fn test_login_failure_shows_server_message() {
        let api = MockApi {
            login_result: Some(Err(ApiError::Unauthorized {
                message: Some("Invalid credentials".to_string()),
            })),
            ..Default::default()
        };
        let (ctx, _, _) = context(api, &["ada@example.com", "wrong"]);
        assert!(dispatch(&ctx, Command::Login { email: None }).is_err());
        assert_eq!(ctx.banner.borrow().as_deref(), Some("Invalid credentials"));
        assert!(!ctx.auth.borrow().is_authenticated());
    }

    #[test]
    fn test_login_validation_skips_api() {
        let (ctx, api, _) = context(signed_in_api(), &["not-an-email", ""]);
        assert!(dispatch(&ctx, Command::Login { email: None }).is_err());
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_protected_commands_need_login() {
        let dir = TempDir::new().unwrap();
        let (ctx, api, _) = context(signed_in_api(), &[]);
        let ctx = ctx.with_activity(ActivityLog::create(dir.path()).unwrap());

        assert!(dispatch(&ctx, Command::Profile { id: None }).is_err());
        assert!(dispatch(&ctx, Command::Donor { id: "3".to_string() }).is_err());
        assert!(dispatch(&ctx, Command::Edit).is_err());
        assert!(api.calls().is_empty());
        assert!(events(&ctx).iter().all(|e| e["type"] == "unauthorized"));
    }

    #[test]
    fn test_register_wizard_end_to_end() {
        let answers = [
            "ada@example.com",
            "password1",
            "password1",
            "Ada",
            "King",
            "555-123-4567",
            "London",
            "n",
            "y",
        ];
        let (ctx, api, _) = context(signed_in_api(), &answers);
        dispatch(&ctx, Command::Register).unwrap();
        assert!(ctx.auth.borrow().is_authenticated());
        let sent = api.registrations.borrow();
        assert!(!sent[0].is_donor);
        assert!(sent[0].donor.is_none());
    }

    #[test]
    fn test_register_wizard_reprompts_invalid_step() {
        let answers = [
            "bad-email",
            "password1",
            "password1",
            "ada@example.com",
            "password1",
            "password1",
            "Ada",
            "King",
            "555-123-4567",
            "London",
            "y",
            "ab-",
            "",
            "y",
            "y",
            "",
        ];
        let (ctx, api, _) = context(signed_in_api(), &answers);
        dispatch(&ctx, Command::Register).unwrap();
        let sent = api.registrations.borrow();
        let donor = sent[0].donor.as_ref().unwrap();
        assert_eq!(donor.blood_group, BloodGroup::AbNeg);
        assert!(donor.available_for_donation);
        assert!(donor.consent_to_contact);
    }

    #[test]
    fn test_register_cancelled_on_end_of_input() {
        let (ctx, api, _) = context(signed_in_api(), &["ada@example.com"]);
        let err = dispatch(&ctx, Command::Register).unwrap_err();
        assert_eq!(err.to_string(), "Cancelled");
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_donors_empty_listing_uses_demo_and_logs_source() {
        let dir = TempDir::new().unwrap();
        let api = MockApi {
            donors_result: Some(Ok(Vec::new())),
            ..Default::default()
        };
        let (ctx, _, _) = context(api, &[]);
        let ctx = ctx.with_activity(ActivityLog::create(dir.path()).unwrap());

        dispatch(&ctx, Command::Donors(SearchArgs::default())).unwrap();
        assert_eq!(ctx.browser.borrow().shown().len(), 5);
        let events = events(&ctx);
        assert_eq!(events[0]["type"], "donor_search");
        assert_eq!(events[0]["source"], "fallback");
    }

    #[test]
    fn test_cleared_session_is_noticed_after_request() {
        let (ctx, _, storage) = context(signed_in_api(), &["password1"]);
        dispatch(
            &ctx,
            Command::Login {
                email: Some("ada@example.com".to_string()),
            },
        )
        .unwrap();
        // what the HTTP client does on a 401
        storage::clear_session(storage.as_ref()).unwrap();

        dispatch(&ctx, Command::Stats).unwrap();
        assert!(!ctx.auth.borrow().is_authenticated());
        assert!(ctx.banner.borrow().is_some());
    }

    #[test]
    fn test_map_geojson_export() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("donors.geojson");
        let (ctx, _, _) = context(MockApi::default(), &[]);
        let args = MapArgs {
            search: SearchArgs {
                blood_group: Some(BloodGroup::APos),
                ..Default::default()
            },
            geojson: Some(out.clone()),
            ..Default::default()
        };
        dispatch(&ctx, Command::Map(args)).unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(doc["features"].as_array().unwrap().len(), 1);
        assert_eq!(ctx.banner.borrow().as_deref(), Some(crate::map::FETCH_FAILED));
    }

    #[test]
    fn test_map_banner_is_shown_once() {
        let (ctx, _, _) = context(MockApi::default(), &[]);
        dispatch(&ctx, Command::Map(MapArgs::default())).unwrap();
        assert_eq!(ctx.banner.borrow().as_deref(), Some(crate::map::FETCH_FAILED));

        let reset = MapArgs {
            reset: true,
            ..Default::default()
        };
        dispatch(&ctx, Command::Map(reset)).unwrap();
        assert!(ctx.banner.borrow().is_none());
        dispatch(&ctx, Command::Map(MapArgs::default())).unwrap();
        assert!(ctx.banner.borrow().is_none());
    }

    #[test]
    fn test_donor_load_banner_is_shown_once() {
        let (ctx, _, _) = context(MockApi::default(), &[]);
        dispatch(&ctx, Command::Donors(SearchArgs::default())).unwrap();
        assert_eq!(ctx.banner.borrow().as_deref(), Some(crate::donors::LOAD_FAILED));

        dispatch(&ctx, Command::Stats).unwrap();
        assert!(ctx.banner.borrow().is_none());
        dispatch(&ctx, Command::Donors(SearchArgs::default())).unwrap();
        assert!(ctx.banner.borrow().is_none());
        assert_eq!(ctx.browser.borrow().shown().len(), 5);
    }

    #[test]
    fn test_edit_becomes_donor() {
        let answers = ["Ada", "King", "555-123-4567", "Paris", "y", "O+", "", "n", "y", "y"];
        let (ctx, api, _) = context(signed_in_api(), &answers);
        ctx.auth.borrow_mut().login("ada@example.com", "password1").unwrap();

        dispatch(&ctx, Command::Edit).unwrap();
        let update = &api.updates.borrow()[0];
        assert_eq!(update.city.as_deref(), Some("Paris"));
        assert_eq!(update.is_donor, Some(true));
        assert_eq!(update.blood_group, Some(BloodGroup::OPos));
        assert_eq!(update.consent_to_contact, Some(true));
        let user = ctx.auth.borrow().user().cloned().unwrap();
        assert!(user.is_donor);
    }

    #[test]
    fn test_repl_lines() {
        let (ctx, _, _) = context(signed_in_api(), &[]);
        assert!(!handle_line(&ctx, "/help"));
        assert!(!handle_line(&ctx, "whoami"));
        assert!(!handle_line(&ctx, "/nonsense"));
        assert!(!handle_line(&ctx, "/dismiss"));
        assert!(handle_line(&ctx, "/exit"));
    }
}
