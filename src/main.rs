mod config;
mod dispatch;
mod error;
mod gemini;
mod mode;
mod pdf;
mod picture;
mod render;
mod session;

use std::path::PathBuf;

use iced::{
    widget::{
        button, column, container, horizontal_rule, image as image_widget, radio, row, scrollable, text,
        text_input, text_input::Id,
        Column,
    },
    window, Color, Element, Font, Length, Size, Task, Theme,
};
use tracing_subscriber::EnvFilter;

use config::{Config, ImageConfig};
use dispatch::{Exchange, Submission};
use error::{DocumentError, SubmitError};
use gemini::GeminiClient;
use mode::{Mode, CROPTO_NOTICE};
use pdf::PdfSource;
use picture::LoadedImage;
use render::{markdown_blocks, render_thread, Block, DisplayRole};
use session::{SessionStore, ThreadKey, ThreadState};

const ACCENT: Color = Color::from_rgb(1.0, 0.294, 0.294);
const WARNING: Color = Color::from_rgb(0.95, 0.75, 0.2);
const PDF_FETCH_FAILED: &str = "Unable to access the PDF, try a different link or reupload the link.";
const IMAGE_PROMPT_MISSING: &str = "Please provide both an image and a prompt";

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("red_dwarf=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config = Config::load();
    let api_key = config::api_key_from_env().inspect_err(|e| tracing::error!("{e}"))?;
    let client = GeminiClient::with_config(config.gemini.base_url.clone(), config.gemini.model.clone(), api_key);

    tracing::info!(model = client.get_model(), vision_model = %config.gemini.vision_model, "starting Red Dwarf AI");

    let window_settings = window::Settings {
        size: Size::new(config.window.width as f32, config.window.height as f32),
        min_size: Some(Size::new(config.window.min_width as f32, config.window.min_height as f32)),
        position: window::Position::Centered,
        ..Default::default()
    };

    iced::application("Red Dwarf AI", App::update, App::view)
        .theme(App::theme)
        .window(window_settings)
        .default_font(Font::MONOSPACE)
        .run_with(move || App::new(config, client))
        .map_err(|e| anyhow::anyhow!("UI error: {e}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PdfSourceKind {
    Local,
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Notice {
    Error(String),
    Warning(String),
}

#[derive(Debug, Clone)]
enum Message {
    ModeSelected(Mode),
    DraftChanged(ThreadKey, String),
    SubmitDraft(ThreadKey),
    ReplyReceived(ThreadKey, Result<Exchange, SubmitError>),
    ClearThread(ThreadKey),
    PdfSourceKindSelected(PdfSourceKind),
    PdfPathChanged(String),
    PdfUrlChanged(String),
    ReadPdf,
    PdfRead(Result<String, DocumentError>),
    ImagePathChanged(String),
    LoadImage,
    ImageLoaded(Result<LoadedImage, DocumentError>),
    ImagePromptChanged(String),
    ProcessImage,
    ImageAnswered(u64, Result<String, SubmitError>),
}

/// UI state around one conversation thread. The turns themselves live in the
/// session store.
#[derive(Default)]
struct ThreadPanel {
    draft: String,
    /// Typed text of the request in flight, handed back to the input if it
    /// fails. Document submissions leave this empty.
    pending: Option<String>,
    in_flight: bool,
    notice: Option<Notice>,
}

#[derive(Default)]
struct ImagePanel {
    path: String,
    prompt: String,
    loaded: Option<LoadedImage>,
    /// Bumped on every loaded image; answers carry the value they were asked with.
    generation: u64,
    preview: Option<image_widget::Handle>,
    answer: Option<String>,
    in_flight: bool,
    notice: Option<Notice>,
}

struct App {
    mode: Mode,
    store: SessionStore,
    client: GeminiClient,
    vision_client: GeminiClient,
    image_config: ImageConfig,
    chat: ThreadPanel,
    pdf: ThreadPanel,
    pdf_source_kind: PdfSourceKind,
    pdf_path: String,
    pdf_url: String,
    image: ImagePanel,
    input_id: Id,
}

impl App {
    fn new(config: Config, client: GeminiClient) -> (Self, Task<Message>) {
        let vision_client = client.for_model(&config.gemini.vision_model);
        let input_id = Id::unique();

        let mut store = SessionStore::new();
        if let Some(key) = Mode::default().select() {
            store.get_or_create_thread(key);
        }

        let app = App {
            mode: Mode::default(),
            store,
            client,
            vision_client,
            image_config: config.image,
            chat: ThreadPanel::default(),
            pdf: ThreadPanel::default(),
            pdf_source_kind: PdfSourceKind::Local,
            pdf_path: String::new(),
            pdf_url: String::new(),
            image: ImagePanel::default(),
            input_id: input_id.clone(),
        };

        (app, text_input::focus(input_id))
    }

    fn panel(&self, key: ThreadKey) -> &ThreadPanel {
        match key {
            ThreadKey::Chat => &self.chat,
            ThreadKey::Pdf => &self.pdf,
        }
    }

    fn panel_mut(&mut self, key: ThreadKey) -> &mut ThreadPanel {
        match key {
            ThreadKey::Chat => &mut self.chat,
            ThreadKey::Pdf => &mut self.pdf,
        }
    }

    fn send(&mut self, key: ThreadKey, submission: Submission) -> Task<Message> {
        tracing::info!(thread = %key, history = submission.history().len(), chars = submission.text().len(), "submitting");

        let panel = self.panel_mut(key);
        panel.in_flight = true;
        panel.notice = None;

        let client = self.client.clone();
        Task::perform(
            async move { dispatch::send(&client, submission).await },
            move |result| Message::ReplyReceived(key, result),
        )
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::ModeSelected(mode) => {
                tracing::debug!(mode = mode.label(), "mode selected");
                self.mode = mode;
                match mode.select() {
                    Some(key) => {
                        self.store.get_or_create_thread(key);
                        text_input::focus(self.input_id.clone())
                    }
                    None => Task::none(),
                }
            }
            Message::DraftChanged(key, value) => {
                self.panel_mut(key).draft = value;
                Task::none()
            }
            Message::SubmitDraft(key) => {
                if self.panel(key).in_flight {
                    return Task::none();
                }

                let draft = std::mem::take(&mut self.panel_mut(key).draft);
                match dispatch::prepare(self.store.get_or_create_thread(key), &draft) {
                    Ok(submission) => {
                        let task = self.send(key, submission);
                        self.panel_mut(key).pending = Some(draft);
                        task
                    }
                    Err(e) => {
                        let panel = self.panel_mut(key);
                        panel.draft = draft;
                        panel.notice = Some(Notice::Warning(e.to_string()));
                        Task::none()
                    }
                }
            }
            Message::ReplyReceived(key, result) => {
                let outcome = result.and_then(|exchange| {
                    tracing::debug!(thread = %key, chars = exchange.reply().content().len(), "reply received");
                    dispatch::commit(self.store.get_or_create_thread(key), exchange).map(|_| ())
                });

                let turns = self.store.thread(key).map_or(0, |t| t.len());
                let panel = self.panel_mut(key);
                panel.in_flight = false;
                let pending = panel.pending.take();

                match outcome {
                    Ok(()) => {
                        tracing::info!(thread = %key, turns, "reply appended");
                    }
                    Err(e) => {
                        tracing::warn!(thread = %key, error = %e, "submission failed");
                        if panel.draft.is_empty() {
                            if let Some(pending) = pending {
                                panel.draft = pending;
                            }
                        }
                        panel.notice = Some(Notice::Error(e.to_string()));
                    }
                }
                Task::none()
            }
            Message::ClearThread(key) => {
                if !self.panel(key).in_flight {
                    self.store.clear(key);
                    self.panel_mut(key).notice = None;
                }
                Task::none()
            }
            Message::PdfSourceKindSelected(kind) => {
                self.pdf_source_kind = kind;
                Task::none()
            }
            Message::PdfPathChanged(value) => {
                self.pdf_path = value;
                Task::none()
            }
            Message::PdfUrlChanged(value) => {
                self.pdf_url = value;
                Task::none()
            }
            Message::ReadPdf => {
                if self.pdf.in_flight {
                    return Task::none();
                }

                let source = match self.pdf_source_kind {
                    PdfSourceKind::Local if !self.pdf_path.trim().is_empty() => {
                        PdfSource::Local(PathBuf::from(self.pdf_path.trim()))
                    }
                    PdfSourceKind::Url if !self.pdf_url.trim().is_empty() => PdfSource::Url(self.pdf_url.clone()),
                    PdfSourceKind::Local => {
                        self.pdf.notice = Some(Notice::Warning("Upload your PDF first".to_string()));
                        return Task::none();
                    }
                    PdfSourceKind::Url => {
                        self.pdf.notice = Some(Notice::Warning("Enter the URL of the PDF".to_string()));
                        return Task::none();
                    }
                };

                self.pdf.in_flight = true;
                self.pdf.notice = None;
                let http = self.client.http().clone();
                Task::perform(async move { pdf::read_pdf(&http, &source).await }, Message::PdfRead)
            }
            Message::PdfRead(Ok(text)) => {
                match dispatch::prepare(self.store.get_or_create_thread(ThreadKey::Pdf), &text) {
                    Ok(submission) => self.send(ThreadKey::Pdf, submission),
                    Err(e) => {
                        self.pdf.in_flight = false;
                        self.pdf.notice = Some(Notice::Warning(e.to_string()));
                        Task::none()
                    }
                }
            }
            Message::PdfRead(Err(e)) => {
                tracing::warn!(error = %e, "could not read PDF");
                self.pdf.in_flight = false;
                let message = if e.is_fetch_failure() {
                    PDF_FETCH_FAILED.to_string()
                } else {
                    format!("Error occurred while reading PDF: {e}")
                };
                self.pdf.notice = Some(Notice::Error(message));
                Task::none()
            }
            Message::ImagePathChanged(value) => {
                self.image.path = value;
                Task::none()
            }
            Message::LoadImage => {
                if self.image.in_flight {
                    return Task::none();
                }
                let path = self.image.path.trim();
                if path.is_empty() {
                    self.image.notice = Some(Notice::Warning("Choose an Image".to_string()));
                    return Task::none();
                }
                let path = PathBuf::from(path);
                Task::perform(async move { picture::load(&path).await }, Message::ImageLoaded)
            }
            Message::ImageLoaded(Ok(loaded)) => {
                let (width, height, pixels) = loaded.display_rgba(self.image_config.display_width);
                self.image.preview = Some(image_widget::Handle::from_rgba(width, height, pixels));
                self.image.loaded = Some(loaded);
                self.image.generation += 1;
                self.image.answer = None;
                self.image.notice = None;
                Task::none()
            }
            Message::ImageLoaded(Err(e)) => {
                tracing::warn!(error = %e, "could not load image");
                self.image.loaded = None;
                self.image.generation += 1;
                self.image.preview = None;
                self.image.notice = Some(Notice::Error(e.to_string()));
                Task::none()
            }
            Message::ImagePromptChanged(value) => {
                self.image.prompt = value;
                Task::none()
            }
            Message::ProcessImage => {
                if self.image.in_flight {
                    return Task::none();
                }
                let Some(loaded) = self.image.loaded.as_ref() else {
                    self.image.notice = Some(Notice::Warning(IMAGE_PROMPT_MISSING.to_string()));
                    return Task::none();
                };
                if self.image.prompt.trim().is_empty() {
                    self.image.notice = Some(Notice::Warning(IMAGE_PROMPT_MISSING.to_string()));
                    return Task::none();
                }

                let encoded = match loaded.encode_for_model(self.image_config.max_upload_dimension) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        self.image.notice = Some(Notice::Error(e.to_string()));
                        return Task::none();
                    }
                };

                tracing::info!(bytes = encoded.data.len(), mime = encoded.mime_type, "asking about image");
                self.image.in_flight = true;
                self.image.notice = None;

                let client = self.vision_client.clone();
                let prompt = self.image.prompt.clone();
                let generation = self.image.generation;
                Task::perform(
                    async move { dispatch::ask_about_image(&client, &prompt, encoded.mime_type, encoded.data).await },
                    move |result| Message::ImageAnswered(generation, result),
                )
            }
            Message::ImageAnswered(generation, result) => {
                self.image.in_flight = false;
                if generation != self.image.generation {
                    tracing::debug!(generation, current = self.image.generation, "dropping answer for a replaced image");
                    return Task::none();
                }
                match result {
                    Ok(answer) => self.image.answer = Some(answer),
                    Err(e) => {
                        tracing::warn!(error = %e, "image question failed");
                        self.image.notice = Some(Notice::Error(e.to_string()));
                    }
                }
                Task::none()
            }
        }
    }

    fn view(&self) -> Element<Message> {
        let header = container(text("✦ Red Dwarf AI").size(40).color(ACCENT)).center_x(Length::Fill);

        let modes = Mode::ALL.iter().fold(row![].spacing(8), |bar, mode| {
            let style: fn(&Theme, button::Status) -> button::Style = if *mode == self.mode {
                button::primary
            } else {
                button::secondary
            };
            bar.push(
                button(text(mode.label()))
                    .on_press(Message::ModeSelected(*mode))
                    .padding(10)
                    .style(style),
            )
        });

        let body: Element<Message> = match self.mode {
            Mode::ChatBot => self.thread_view(ThreadKey::Chat),
            Mode::PdfReader => column![self.pdf_controls(), self.thread_view(ThreadKey::Pdf)]
                .spacing(15)
                .into(),
            Mode::ImageNerd => self.image_view(),
            Mode::CroptoIndicator => container(text(CROPTO_NOTICE).size(18)).padding(20).into(),
        };

        container(
            column![header, container(modes).center_x(Length::Fill), body]
                .spacing(15)
                .padding(15),
        )
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
    }

    fn thread_view(&self, key: ThreadKey) -> Element<Message> {
        let panel = self.panel(key);
        let thread = self.store.thread(key);

        let turns = thread
            .map(render_thread)
            .unwrap_or_default()
            .into_iter()
            .fold(Column::new().spacing(10), |col, turn| col.push(turn_view(turn.role, turn.content)));

        let turns = if panel.in_flight {
            turns.push(text("Red Dwarf is thinking...").size(15))
        } else {
            turns
        };

        let mut input = text_input("Ask Red Dwarf...", &panel.draft)
            .padding(12)
            .size(16)
            .id(self.input_id.clone());
        if !panel.in_flight {
            input = input
                .on_input(move |value| Message::DraftChanged(key, value))
                .on_submit(Message::SubmitDraft(key));
        }

        let clear = thread
            .filter(|t| t.state() == ThreadState::HasHistory && !panel.in_flight)
            .map(|_| button(text("Clear Chat")).on_press(Message::ClearThread(key)));

        column![scrollable(turns.padding(5)).height(Length::Fill)]
            .push_maybe(panel.notice.as_ref().map(notice_view))
            .push(input)
            .push_maybe(clear)
            .spacing(10)
            .into()
    }

    fn pdf_controls(&self) -> Element<Message> {
        let kinds = row![
            radio(
                "Upload from local device",
                PdfSourceKind::Local,
                Some(self.pdf_source_kind),
                Message::PdfSourceKindSelected
            ),
            radio(
                "Upload from online link",
                PdfSourceKind::Url,
                Some(self.pdf_source_kind),
                Message::PdfSourceKindSelected
            ),
        ]
        .spacing(20);

        let (input, label) = match self.pdf_source_kind {
            PdfSourceKind::Local => (
                text_input("Path to your PDF", &self.pdf_path).on_input(Message::PdfPathChanged),
                "Read the PDF",
            ),
            PdfSourceKind::Url => (
                text_input("Enter the URL of the PDF:", &self.pdf_url).on_input(Message::PdfUrlChanged),
                "Read from URL",
            ),
        };
        let read = button(text(label)).on_press_maybe((!self.pdf.in_flight).then_some(Message::ReadPdf));

        column![
            text("Select PDF upload option:"),
            kinds,
            row![input.on_submit(Message::ReadPdf).padding(10), read].spacing(10),
        ]
        .spacing(10)
        .into()
    }

    fn image_view(&self) -> Element<Message> {
        let picker = row![
            text_input("Choose an Image (png, jpg, jpeg, webp)", &self.image.path)
                .on_input(Message::ImagePathChanged)
                .on_submit(Message::LoadImage)
                .padding(10),
            button(text("Load")).on_press(Message::LoadImage),
        ]
        .spacing(10);

        let preview = self.image.preview.as_ref().map(|handle| {
            container(image_widget(handle.clone())).center_x(Length::Fill)
        });

        let prompt = column![
            text("Interact with the Image"),
            text_input("Prompt", &self.image.prompt)
                .on_input(Message::ImagePromptChanged)
                .on_submit(Message::ProcessImage)
                .padding(10),
        ]
        .spacing(5);

        let process = self.image.loaded.as_ref().map(|_| {
            button(text("Process the Image"))
                .on_press_maybe((!self.image.in_flight).then_some(Message::ProcessImage))
        });

        let answer: Option<Element<Message>> = if self.image.in_flight {
            Some(text("Red Dwarf is looking...").size(15).into())
        } else {
            self.image.answer.as_deref().map(|a| turn_view(DisplayRole::Assistant, a))
        };

        scrollable(
            column![picker]
                .push_maybe(preview)
                .push(prompt)
                .push_maybe(process)
                .push_maybe(self.image.notice.as_ref().map(notice_view))
                .push_maybe(answer)
                .spacing(15),
        )
        .height(Length::Fill)
        .into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}

fn notice_view(notice: &Notice) -> Element<'_, Message> {
    match notice {
        Notice::Error(message) => text(message.as_str()).color(ACCENT).into(),
        Notice::Warning(message) => text(message.as_str()).size(20).color(WARNING).into(),
    }
}

fn turn_view(role: DisplayRole, content: &str) -> Element<'static, Message> {
    let body = markdown_blocks(content)
        .into_iter()
        .fold(Column::new().spacing(6), |col, block| col.push(block_view(block)));

    let label = match role {
        DisplayRole::User => text(role.label()).size(12),
        DisplayRole::Assistant => text(role.label()).size(12).color(ACCENT),
    };

    container(column![label, body].spacing(4))
        .padding(10)
        .width(Length::Fill)
        .style(container::rounded_box)
        .into()
}

fn block_view(block: Block) -> Element<'static, Message> {
    match block {
        Block::Heading(level, heading) => text(heading)
            .size(match level {
                1 => 26,
                2 => 22,
                3 => 19,
                _ => 17,
            })
            .into(),
        Block::Paragraph(paragraph) => text(paragraph).size(15).into(),
        Block::ListItem(item) => text(format!("• {item}")).size(15).into(),
        Block::Code(code) => container(text(code).size(14))
            .padding(8)
            .width(Length::Fill)
            .style(container::bordered_box)
            .into(),
        Block::Rule => horizontal_rule(1).into(),
    }
}
