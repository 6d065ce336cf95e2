use std::fs;
use std::io::{BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use alf_contracts::chat::{parse_intent, Action, Intent, CHAT_HELP_COMMANDS};
use alf_contracts::prompts::{format_prompt_display, sanitize_filename, truncate_text};
use alf_contracts::{validate_prompt_length, CharacterTheme, Page, Session, Stage, ThemeId};
use alf_engine::{generate_filename, image_to_png_bytes, validate_api_key, Studio};
use anyhow::{Context, Result};
use chrono::Local;

const HISTORY_SHOWN: usize = 5;
const PROMPT_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Line-oriented host for one session. Each loop iteration renders the
/// current page and applies at most one line of input.
pub struct Console<'a, R, W> {
    studio: &'a Studio,
    session: &'a mut Session,
    input: R,
    out: W,
    output_dir: PathBuf,
    pending_generation: bool,
    /// Theme whose generation produced the session's current image.
    result_theme: Option<ThemeId>,
}

impl<'a, R: BufRead, W: Write> Console<'a, R, W> {
    pub fn new(
        studio: &'a Studio,
        session: &'a mut Session,
        input: R,
        out: W,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            studio,
            session,
            input,
            out,
            output_dir: output_dir.into(),
            pending_generation: false,
            result_theme: None,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        writeln!(
            self.out,
            "ALF Abstractor studio ({}). Type /help for commands.",
            self.studio.provider_name()
        )?;
        loop {
            let page = self.session.resolve_page();
            let flow = match &page {
                Page::Landing => self.render_landing()?,
                Page::FriendsMenu => self.render_friends()?,
                Page::Solo(stage) | Page::Friend { stage, .. } => {
                    match self.studio.catalog().theme_for_page(&page).cloned() {
                        Some(theme) => self.render_stage(&theme, *stage)?,
                        None => {
                            self.session.navigate_to_landing();
                            Flow::Continue
                        }
                    }
                }
            };
            if flow == Flow::Quit {
                break;
            }
        }
        writeln!(self.out, "You do not summon ALF. He allows himself to be seen.")?;
        Ok(())
    }

    fn read_intent(&mut self) -> Result<Option<Intent>> {
        let mut line = String::new();
        loop {
            write!(self.out, "> ")?;
            self.out.flush()?;
            line.clear();
            match self.input.read_line(&mut line) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
            let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
            if intent.action != Action::Noop {
                return Ok(Some(intent));
            }
        }
    }

    fn render_landing(&mut self) -> Result<Flow> {
        let mascot = self.studio.catalog().mascot().clone();
        writeln!(self.out)?;
        writeln!(self.out, "{} {}", mascot.emoji, mascot.tagline)?;
        writeln!(self.out, "  /solo     summon {} alone", mascot.display_name)?;
        writeln!(self.out, "  /friends  bring a friend along")?;

        let Some(intent) = self.read_intent()? else {
            return Ok(Flow::Quit);
        };
        match intent.action {
            Action::Solo => self.session.navigate_to_prompt(),
            Action::Friends => self.session.navigate_to_friends(),
            Action::SetPrompt => {
                writeln!(self.out, "Choose /solo or /friends first.")?;
            }
            _ => return self.handle_common(intent, None),
        }
        Ok(Flow::Continue)
    }

    fn render_friends(&mut self) -> Result<Flow> {
        let catalog = self.studio.catalog();
        writeln!(self.out)?;
        writeln!(self.out, "Pick a friend for {}:", catalog.mascot().display_name)?;
        for (idx, friend) in catalog.friends().enumerate() {
            writeln!(
                self.out,
                "  {:>2}. {} ({}) {}",
                idx + 1,
                friend.label(),
                friend.id,
                truncate_text(&friend.tagline, 70)
            )?;
        }

        let Some(intent) = self.read_intent()? else {
            return Ok(Flow::Quit);
        };
        match intent.action {
            Action::Pick => {
                let choice = intent.arg.clone().unwrap_or_default();
                match self.resolve_friend(&choice) {
                    Some(id) => {
                        self.session.navigate(id.as_str(), Stage::Prompt)?;
                    }
                    None => writeln!(self.out, "No friend called '{choice}'.")?,
                }
            }
            Action::Back => self.session.navigate_to_landing(),
            _ => return self.handle_common(intent, None),
        }
        Ok(Flow::Continue)
    }

    fn resolve_friend(&self, choice: &str) -> Option<ThemeId> {
        let catalog = self.studio.catalog();
        let choice = choice.trim();
        let theme = match choice.parse::<usize>() {
            Ok(position) => catalog.friend_at(position),
            Err(_) => catalog.friend(&choice.to_ascii_lowercase()),
        };
        theme.map(|theme| theme.id.clone())
    }

    fn render_stage(&mut self, theme: &CharacterTheme, stage: Stage) -> Result<Flow> {
        match stage {
            Stage::Prompt => self.render_prompt(theme),
            Stage::Generating => self.render_generating(theme),
            Stage::Result => self.render_result(theme),
        }
    }

    fn back_from(&mut self, theme: &CharacterTheme) {
        if self.studio.catalog().is_mascot(theme.id.as_str()) {
            self.session.navigate_to_landing();
        } else {
            self.session.navigate_to_friends();
        }
    }

    fn render_prompt(&mut self, theme: &CharacterTheme) -> Result<Flow> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", theme.title)?;
        writeln!(self.out, "{}", theme.description)?;
        let references = self
            .studio
            .references_for(self.session, theme.id.as_str())
            .len();
        writeln!(self.out, "Reference images ready: {references}")?;
        if self.session.has_prompt() {
            writeln!(self.out, "Prompt: {}", self.session.get_current_prompt())?;
            writeln!(self.out, "Type a new prompt or /generate.")?;
        }

        let Some(intent) = self.read_intent()? else {
            return Ok(Flow::Quit);
        };
        match intent.action {
            Action::SetPrompt => {
                let prompt = intent.prompt.unwrap_or_default();
                if let Err(issue) = validate_prompt_length(&prompt) {
                    writeln!(self.out, "{issue}")?;
                }
                self.session.set_current_prompt(prompt);
            }
            Action::Generate => {
                match validate_prompt_length(self.session.get_current_prompt()) {
                    Ok(()) => {
                        self.pending_generation = true;
                        self.session.navigate(theme.id.as_str(), Stage::Generating)?;
                    }
                    Err(issue) => writeln!(self.out, "{issue}")?,
                }
            }
            Action::Back => self.back_from(theme),
            _ => return self.handle_common(intent, Some(theme)),
        }
        Ok(Flow::Continue)
    }

    fn render_generating(&mut self, theme: &CharacterTheme) -> Result<Flow> {
        if self.pending_generation {
            self.pending_generation = false;
            writeln!(
                self.out,
                "Summoning {} ... {}",
                theme.label(),
                format_prompt_display(self.session.get_current_prompt())
            )?;
            match self.studio.generate(self.session, theme.id.as_str()) {
                Ok(outcome) => {
                    self.result_theme = Some(theme.id.clone());
                    writeln!(
                        self.out,
                        "Manifested {}x{} image from {} references.",
                        outcome.image.width(),
                        outcome.image.height(),
                        outcome.reference_count
                    )?;
                }
                Err(err) => {
                    if err.is_generation() {
                        log::warn!("generation for {} failed: {err}", theme.id);
                    } else {
                        log::error!("generation for {} failed: {err:?}", theme.id);
                    }
                    writeln!(self.out, "{err}")?;
                    writeln!(self.out, "Use /generate to try again or /back to edit the prompt.")?;
                }
            }
            return Ok(Flow::Continue);
        }

        let Some(intent) = self.read_intent()? else {
            return Ok(Flow::Quit);
        };
        match intent.action {
            Action::Generate => self.pending_generation = true,
            Action::Back => self.session.navigate(theme.id.as_str(), Stage::Prompt)?,
            Action::SetPrompt => {
                let prompt = intent.prompt.unwrap_or_default();
                match validate_prompt_length(&prompt) {
                    Ok(()) => {
                        self.session.set_current_prompt(prompt);
                        self.pending_generation = true;
                    }
                    Err(issue) => writeln!(self.out, "{issue}")?,
                }
            }
            _ => return self.handle_common(intent, Some(theme)),
        }
        Ok(Flow::Continue)
    }

    fn render_result(&mut self, theme: &CharacterTheme) -> Result<Flow> {
        writeln!(self.out)?;
        match self.session.get_generated_image() {
            Some(image) => writeln!(
                self.out,
                "{} result: {}x{} image",
                theme.label(),
                image.width(),
                image.height()
            )?,
            None => writeln!(self.out, "No ALF manifested in the digital realm...")?,
        }
        if self.session.has_prompt() {
            writeln!(
                self.out,
                "Prompt: {}",
                truncate_text(
                    &format_prompt_display(self.session.get_current_prompt()),
                    PROMPT_PREVIEW_CHARS
                )
            )?;
        }
        self.write_history()?;
        writeln!(self.out, "  /save [path]  /another  /friends  /new")?;

        let Some(intent) = self.read_intent()? else {
            return Ok(Flow::Quit);
        };
        match intent.action {
            Action::Save => {
                let target = intent.arg.as_deref().map(Path::new);
                match self.save_generated(target) {
                    Ok(Some(path)) => writeln!(self.out, "Saved {}", path.display())?,
                    Ok(None) => writeln!(self.out, "Nothing to save yet.")?,
                    Err(err) => writeln!(self.out, "Save failed: {err:#}")?,
                }
            }
            Action::Another => {
                self.session.navigate(theme.id.as_str(), Stage::Prompt)?;
                self.session.set_current_prompt("");
            }
            Action::Back => self.back_from(theme),
            _ => return self.handle_common(intent, Some(theme)),
        }
        Ok(Flow::Continue)
    }

    fn write_history(&mut self) -> Result<()> {
        let history = self.session.history();
        if history.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "Recent manifestations ({}):", history.len())?;
        for entry in history.iter().rev().take(HISTORY_SHOWN) {
            writeln!(
                self.out,
                "  [{}] {}",
                entry.created_at.with_timezone(&Local).format("%H:%M:%S"),
                truncate_text(&entry.prompt, 60)
            )?;
        }
        Ok(())
    }

    fn save_generated(&self, target: Option<&Path>) -> Result<Option<PathBuf>> {
        let Some(image) = self.session.get_generated_image() else {
            return Ok(None);
        };
        let path = match target {
            Some(path) => path.to_path_buf(),
            None => {
                let name = generate_filename(
                    self.session.get_current_prompt(),
                    chrono::Utc::now().timestamp(),
                );
                self.output_dir.join(sanitize_filename(&name))
            }
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let bytes = image_to_png_bytes(image)?;
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(Some(path))
    }

    /// Commands that mean the same thing on every page.
    fn handle_common(&mut self, intent: Intent, theme: Option<&CharacterTheme>) -> Result<Flow> {
        match intent.action {
            Action::Quit => return Ok(Flow::Quit),
            Action::Help => {
                for (command, about) in CHAT_HELP_COMMANDS {
                    writeln!(self.out, "  {command:<16} {about}")?;
                }
            }
            Action::Solo => self.session.navigate_to_prompt(),
            Action::Friends => self.session.navigate_to_friends(),
            Action::Back => self.session.navigate_to_landing(),
            Action::NewSession => {
                self.pending_generation = false;
                self.result_theme = None;
                self.session.reset_to_landing();
                writeln!(self.out, "Session cleared.")?;
            }
            Action::Clear => {
                self.pending_generation = false;
                self.result_theme = None;
                self.session.clear_session();
                writeln!(self.out, "Session cleared; staying on {}.", self.session.get_current_page())?;
            }
            Action::SetApiKey => {
                let key = intent.arg.unwrap_or_default();
                if validate_api_key(&key) {
                    self.session.set_api_key(Some(key));
                    writeln!(self.out, "API key set for this session.")?;
                } else {
                    writeln!(self.out, "Invalid API key format. Please check your OpenAI API key.")?;
                }
            }
            Action::History => {
                if self.session.history().is_empty() {
                    writeln!(self.out, "No generations yet.")?;
                }
                self.write_history()?;
            }
            Action::ShowReferences => self.write_references(theme)?,
            Action::ReloadReferences => self.reload_references(theme)?,
            Action::ShowResult => match self.result_theme.clone() {
                Some(id) if self.session.has_generated_image() => {
                    self.session.navigate(id.as_str(), Stage::Result)?;
                }
                _ => writeln!(self.out, "No result to show yet.")?,
            },
            Action::Pick | Action::Generate | Action::Save | Action::Another => {
                writeln!(self.out, "{} is not available here.", intent.raw.trim())?;
            }
            Action::SetPrompt => {
                writeln!(self.out, "Open a prompt page first (/solo or /friends).")?;
            }
            Action::Unknown => {
                writeln!(
                    self.out,
                    "Unknown command /{}. Type /help.",
                    intent.arg.unwrap_or_default()
                )?;
            }
            Action::Noop => {}
        }
        Ok(Flow::Continue)
    }

    fn scoped_themes(&self, theme: Option<&CharacterTheme>) -> Vec<ThemeId> {
        let catalog = self.studio.catalog();
        match theme {
            Some(theme) if catalog.is_mascot(theme.id.as_str()) => vec![theme.id.clone()],
            Some(theme) => vec![catalog.mascot_id().clone(), theme.id.clone()],
            None => catalog.ids(),
        }
    }

    fn write_references(&mut self, theme: Option<&CharacterTheme>) -> Result<()> {
        for id in self.scoped_themes(theme) {
            let info = self.studio.references().info(&id);
            writeln!(
                self.out,
                "  {id}: {} cached, {} on disk in {}",
                self.session.get_reference_images(id.as_str()).len(),
                info.image_count(),
                info.folder.display()
            )?;
        }
        Ok(())
    }

    fn reload_references(&mut self, theme: Option<&CharacterTheme>) -> Result<()> {
        for id in self.scoped_themes(theme) {
            let load = self.studio.reload_references(self.session, id.as_str());
            for warning in &load.warnings {
                writeln!(self.out, "  warning: {warning}")?;
            }
            writeln!(self.out, "  {id}: loaded {} reference images", load.images.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use alf_contracts::{Page, Session, Stage, ThemeCatalog};
    use alf_engine::providers::DryrunProvider;
    use alf_engine::{
        EngineError, GenerateRequest, GenerateResponse, GenerationError, ImageProvider,
        ReferenceStore, Studio,
    };

    use super::Console;

    struct RefusingProvider {
        calls: Arc<AtomicUsize>,
    }

    impl ImageProvider for RefusingProvider {
        fn name(&self) -> &str {
            "refusing"
        }

        fn generate(&self, _request: &GenerateRequest) -> Result<GenerateResponse, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(GenerationError::Api("service unavailable".to_string()).into())
        }
    }

    fn studio_with(references: &Path, provider: Box<dyn ImageProvider>) -> Studio {
        let catalog = Arc::new(ThemeCatalog::bundled().expect("bundled catalog"));
        let store = ReferenceStore::new(references, catalog.mascot_id().clone());
        Studio::new(catalog, provider, store)
    }

    fn studio(references: &Path) -> Studio {
        studio_with(references, Box::new(DryrunProvider::new("8x8")))
    }

    fn drive(studio: &Studio, session: &mut Session, script: &str, out_dir: &Path) -> String {
        let mut out = Vec::new();
        Console::new(studio, session, Cursor::new(script.to_string()), &mut out, out_dir)
            .run()
            .expect("console run");
        String::from_utf8(out).expect("utf8 output")
    }

    #[test]
    fn solo_flow_generates_and_saves() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let studio = studio(temp.path());
        let mut session = Session::new(Arc::clone(studio.catalog()));
        let target = temp.path().join("out").join("alf.png");
        let script = format!(
            "/solo\nALF floating in a cosmic swamp\n/generate\n/save \"{}\"\n",
            target.display()
        );

        let output = drive(&studio, &mut session, &script, temp.path());

        assert_eq!(session.get_current_page(), &Page::Solo(Stage::Result));
        assert_eq!(session.history().len(), 1);
        assert!(output.contains("Manifested 8x8 image"));
        assert!(output.contains("Recent manifestations (1):"));
        assert!(target.is_file());
        Ok(())
    }

    #[test]
    fn friend_flow_picks_by_number_and_makes_another() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let studio = studio(temp.path());
        let mut session = Session::new(Arc::clone(studio.catalog()));
        let script = "/friends\n/pick 5\nsharing a pizza on the moon\n/generate\n/another\n";

        drive(&studio, &mut session, script, temp.path());

        assert_eq!(session.get_current_page().key(), "pepe_prompt");
        assert_eq!(session.get_current_prompt(), "");
        assert_eq!(session.history().len(), 1);
        Ok(())
    }

    #[test]
    fn short_prompt_is_rejected_before_generating() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let studio = studio(temp.path());
        let mut session = Session::new(Arc::clone(studio.catalog()));

        let output = drive(&studio, &mut session, "/solo\nhey\n/generate\n", temp.path());

        assert!(output.contains("Prompt too short. Need at least 5 characters."));
        assert_eq!(session.get_current_page(), &Page::Solo(Stage::Prompt));
        assert!(session.history().is_empty());
        Ok(())
    }

    #[test]
    fn short_prompt_on_generating_page_does_not_retry() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = RefusingProvider {
            calls: Arc::clone(&calls),
        };
        let studio = studio_with(temp.path(), Box::new(provider));
        let mut session = Session::new(Arc::clone(studio.catalog()));

        let output = drive(
            &studio,
            &mut session,
            "/solo\nALF floating in a swamp\n/generate\nhi\n",
            temp.path(),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(output.contains("The ALF spirits encountered an error: service unavailable"));
        assert!(output.contains("Prompt too short. Need at least 5 characters."));
        assert_eq!(session.get_current_prompt(), "ALF floating in a swamp");
        assert_eq!(session.get_current_page(), &Page::Solo(Stage::Generating));
        assert!(session.history().is_empty());
        Ok(())
    }

    #[test]
    fn result_command_returns_to_the_theme_that_generated() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let studio = studio(temp.path());
        let mut session = Session::new(Arc::clone(studio.catalog()));

        drive(
            &studio,
            &mut session,
            "/friends\n/pick pepe\nsharing a pizza on the moon\n/generate\n/friends\n/pick polly\n/result\n",
            temp.path(),
        );
        assert_eq!(session.get_current_page().key(), "pepe_result");

        let output = drive(&studio, &mut session, "/new\n/result\n", temp.path());
        assert!(output.contains("No result to show yet."));
        assert_eq!(session.get_current_page(), &Page::Landing);
        Ok(())
    }

    #[test]
    fn unknown_friend_and_bad_key_are_reported() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let studio = studio(temp.path());
        let mut session = Session::new(Arc::clone(studio.catalog()));

        let output = drive(
            &studio,
            &mut session,
            "/friends\n/pick kermit\n/key nope\n/wat\n",
            temp.path(),
        );

        assert!(output.contains("No friend called 'kermit'."));
        assert!(output.contains("Invalid API key format."));
        assert!(output.contains("Unknown command /wat."));
        assert_eq!(session.get_current_page(), &Page::FriendsMenu);
        assert!(!session.has_api_key());
        Ok(())
    }

    #[test]
    fn clear_keeps_page_and_new_goes_home() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let studio = studio(temp.path());
        let mut session = Session::new(Arc::clone(studio.catalog()));

        drive(
            &studio,
            &mut session,
            "/friends\n/pick polly\nice skating together\n/clear\n",
            temp.path(),
        );
        assert_eq!(session.get_current_page().key(), "polly_prompt");
        assert!(!session.has_prompt());

        drive(&studio, &mut session, "/new\n", temp.path());
        assert_eq!(session.get_current_page(), &Page::Landing);
        Ok(())
    }

    #[test]
    fn reload_reads_reference_folder() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        image::RgbImage::from_pixel(4, 4, image::Rgb([0, 255, 0]))
            .save(temp.path().join("alf.png"))?;
        let studio = studio(temp.path());
        let mut session = Session::new(Arc::clone(studio.catalog()));

        let output = drive(&studio, &mut session, "/solo\n/reload\n/refs\n", temp.path());

        assert!(output.contains("alf: loaded 1 reference images"));
        assert_eq!(session.get_reference_images("alf").len(), 1);
        Ok(())
    }
}
