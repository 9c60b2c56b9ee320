mod api;
mod chat;
mod config;
mod images;
mod markdown;

use iced::{
    alignment, font, time, window,
    widget::{
        button, column, container, horizontal_rule, image, row, scrollable, text, text_input, Column, Image, Row,
    },
    Border, Color, ContentFit, Element, Font, Length, Padding, Size, Subscription, Task, Theme,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::api::ApiClient;
use crate::chat::{ChatMessage, ChatRequest, ChatState, MessageId, RequestKind, Role, Ticket};
use crate::images::{Attachment, MAX_IMAGES};
use crate::markdown::Block;

const TITLE: &str = "Chat AI com Visão";
const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Config::load();
    tracing::info!("Using backend at {}", config.backend.base_url);

    let window_settings = window::Settings {
        size: Size::new(config.window.width as f32, config.window.height as f32),
        min_size: Some(Size::new(
            config.window.min_width as f32,
            config.window.min_height as f32,
        )),
        position: window::Position::Centered,
        ..Default::default()
    };

    iced::application(TITLE, App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window_settings)
        .run_with(move || App::new(config))
}

#[derive(Debug, Clone)]
enum Message {
    InputChanged(String),
    Submit,
    Regenerate(MessageId),
    Resolved(Ticket, Result<String, String>),
    PickImages,
    ImagesPicked(Vec<PathBuf>),
    ImagesEncoded(Vec<Attachment>),
    RemoveImage(usize),
    ConnectionChecked(Result<(), String>),
    Tick,
}

#[derive(Debug, Clone, PartialEq)]
enum BackendStatus {
    Checking,
    Online,
    Offline(String),
}

struct App {
    chat: ChatState,
    client: ApiClient,
    markdown: HashMap<MessageId, Vec<Block>>,
    backend_status: BackendStatus,
    picking_images: bool,
    loading_frame: usize,
    input_id: text_input::Id,
    scroll_id: scrollable::Id,
}

impl App {
    fn new(config: config::Config) -> (Self, Task<Message>) {
        let client = ApiClient::new(config.backend.base_url);
        let input_id = text_input::Id::unique();

        let app = App {
            chat: ChatState::new(),
            client: client.clone(),
            markdown: HashMap::new(),
            backend_status: BackendStatus::Checking,
            picking_images: false,
            loading_frame: 0,
            input_id: input_id.clone(),
            scroll_id: scrollable::Id::unique(),
        };

        let check_task = Task::perform(
            async move { client.test_connection().await.map(|_| ()).map_err(|e| e.to_string()) },
            Message::ConnectionChecked,
        );
        let focus_task = text_input::focus(input_id);

        (app, Task::batch([check_task, focus_task]))
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::InputChanged(value) => {
                self.chat.set_input(value);
                Task::none()
            }
            Message::Submit => match self.chat.submit() {
                Some(request) => Task::batch([self.dispatch(request), self.scroll_to_end()]),
                None => Task::none(),
            },
            Message::Regenerate(id) => match self.chat.regenerate(id) {
                Some(request) => {
                    self.markdown.remove(&id);
                    self.dispatch(request)
                }
                None => Task::none(),
            },
            Message::Resolved(ticket, outcome) => {
                if let Err(e) = &outcome {
                    tracing::warn!("Request for message {} failed: {}", ticket.placeholder, e);
                }
                self.chat.resolve(ticket, outcome);
                self.refresh_markdown(ticket.placeholder);
                self.scroll_to_end()
            }
            Message::PickImages => {
                if self.picking_images || self.chat.images().is_full() {
                    return Task::none();
                }
                self.picking_images = true;
                Task::perform(images::pick_image_files(), Message::ImagesPicked)
            }
            Message::ImagesPicked(paths) => {
                if paths.is_empty() {
                    self.picking_images = false;
                    return Task::none();
                }
                tracing::debug!("Encoding {} selected files", paths.len());
                Task::perform(images::encode_files(paths), Message::ImagesEncoded)
            }
            Message::ImagesEncoded(attachments) => {
                self.picking_images = false;
                self.chat.add_images(attachments);
                Task::none()
            }
            Message::RemoveImage(index) => {
                self.chat.remove_image(index);
                Task::none()
            }
            Message::ConnectionChecked(result) => {
                self.backend_status = match result {
                    Ok(()) => BackendStatus::Online,
                    Err(e) => BackendStatus::Offline(e),
                };
                Task::none()
            }
            Message::Tick => {
                if self.chat.is_loading() {
                    self.loading_frame = (self.loading_frame + 1) % SPINNER_FRAMES.len();
                }
                Task::none()
            }
        }
    }

    fn dispatch(&self, request: ChatRequest) -> Task<Message> {
        let client = self.client.clone();
        let ticket = request.ticket;

        Task::perform(
            async move {
                let result = match ticket.kind {
                    RequestKind::Send => client.send_message(&request.text, &request.image_urls).await,
                    RequestKind::Regenerate => {
                        client.regenerate_response(&request.text, &request.image_urls).await
                    }
                };
                result.map_err(|e| e.to_string())
            },
            move |outcome| Message::Resolved(ticket, outcome),
        )
    }

    fn refresh_markdown(&mut self, id: MessageId) {
        let transcript = self.chat.transcript();
        self.markdown.retain(|kept, _| transcript.iter().any(|m| m.id == *kept));

        if let Some(message) = transcript
            .iter()
            .find(|m| m.id == id && m.role == Role::Bot && !m.is_loading)
        {
            self.markdown.insert(id, markdown::parse(&message.text));
        }
    }

    fn scroll_to_end(&self) -> Task<Message> {
        scrollable::snap_to(self.scroll_id.clone(), scrollable::RelativeOffset::END)
    }

    fn subscription(&self) -> Subscription<Message> {
        if self.chat.is_loading() {
            time::every(Duration::from_millis(80)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        }
    }

    fn status_line(&self) -> String {
        match &self.backend_status {
            BackendStatus::Checking => format!("Verificando conexão com {}...", self.client.base_url()),
            BackendStatus::Online => format!("Conectado a {}", self.client.base_url()),
            BackendStatus::Offline(e) => format!("Sem conexão com {}: {}", self.client.base_url(), e),
        }
    }

    fn view(&self) -> Element<Message> {
        let header = column![
            text(TITLE).size(28).font(bold()),
            text(self.status_line()).size(13),
        ]
        .spacing(4);

        let messages = self
            .chat
            .transcript()
            .iter()
            .fold(Column::new().spacing(15), |col, message| col.push(self.view_message(message)));

        let transcript = scrollable(container(messages).padding(20).width(Length::Fill))
            .id(self.scroll_id.clone())
            .height(Length::Fill);

        let mut content = column![header, horizontal_rule(2), transcript, self.view_form()]
            .spacing(15)
            .padding(20)
            .max_width(800.0);

        if let Some(error) = self.chat.error() {
            content = content.push(
                container(text(error).size(14).color(Color::from_rgb8(0xff, 0x44, 0x44)))
                    .padding(10)
                    .width(Length::Fill)
                    .style(error_banner),
            );
        }

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .align_x(alignment::Horizontal::Center)
            .into()
    }

    fn view_message<'a>(&'a self, message: &'a ChatMessage) -> Element<'a, Message> {
        let is_user = message.role == Role::User;

        let mut content = Column::new().spacing(8).max_width(560.0);
        for attachment in &message.images {
            content = content.push(
                Image::<image::Handle>::new(attachment.preview().clone())
                    .width(Length::Fixed(300.0))
                    .content_fit(ContentFit::Contain),
            );
        }

        let body: Element<Message> = if message.is_loading {
            text(SPINNER_FRAMES[self.loading_frame]).size(20).into()
        } else if is_user {
            text(message.text.as_str()).size(15).into()
        } else {
            match self.markdown.get(&message.id) {
                Some(blocks) => render_markdown(blocks),
                None => text(message.text.as_str()).size(15).into(),
            }
        };

        let bubble = container(body)
            .padding([12, 16])
            .style(if is_user { user_bubble } else { bot_bubble });
        content = content.push(bubble);

        if !is_user && !message.is_loading {
            let regenerate = button(text("🔄 Regenerar resposta").size(13))
                .padding([6, 12])
                .style(button::secondary)
                .on_press_maybe((!self.chat.is_loading()).then_some(Message::Regenerate(message.id)));
            content = content.push(regenerate);
        }

        let align = if is_user {
            alignment::Horizontal::Right
        } else {
            alignment::Horizontal::Left
        };

        container(content).width(Length::Fill).align_x(align).into()
    }

    fn view_form(&self) -> Element<Message> {
        let queue = self.chat.images();

        let picker_label = if queue.is_full() {
            "📷 Limite de imagens atingido".to_string()
        } else {
            format!("📷 Adicionar imagem ({}/{})", queue.len(), MAX_IMAGES)
        };
        let picker = button(text(picker_label).size(14))
            .padding([8, 12])
            .style(button::secondary)
            .on_press_maybe((!queue.is_full() && !self.picking_images).then_some(Message::PickImages));

        let previews = queue
            .iter()
            .enumerate()
            .fold(Row::new().spacing(8), |row, (index, attachment)| {
                row.push(
                    column![
                        Image::<image::Handle>::new(attachment.preview().clone())
                            .width(Length::Fixed(40.0))
                            .height(Length::Fixed(40.0))
                            .content_fit(ContentFit::Cover),
                        button(text("×").size(12))
                            .padding([0, 6])
                            .style(button::danger)
                            .on_press(Message::RemoveImage(index)),
                    ]
                    .spacing(2)
                    .align_x(alignment::Horizontal::Center),
                )
            });

        let input = text_input("Digite sua mensagem...", self.chat.input())
            .on_input(Message::InputChanged)
            .on_submit(Message::Submit)
            .padding(12)
            .size(16)
            .id(self.input_id.clone());

        let send_label = if self.chat.is_loading() { "Enviando..." } else { "Enviar" };
        let send = button(text(send_label).size(16))
            .padding([12, 24])
            .on_press_maybe(self.chat.can_submit().then_some(Message::Submit));

        column![
            row![picker, previews].spacing(10).align_y(alignment::Vertical::Center),
            row![input, send].spacing(10),
        ]
        .spacing(10)
        .into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}

fn bold() -> Font {
    Font {
        weight: font::Weight::Bold,
        ..Font::DEFAULT
    }
}

fn heading_size(level: u8) -> f32 {
    match level {
        1 => 24.0,
        2 => 21.0,
        3 => 18.0,
        _ => 16.0,
    }
}

fn render_markdown(blocks: &[Block]) -> Element<'_, Message> {
    blocks
        .iter()
        .fold(Column::new().spacing(10), |col, block| {
            let element: Element<Message> = match block {
                Block::Heading { level, text: heading } => text(heading.as_str())
                    .size(heading_size(*level))
                    .font(bold())
                    .into(),
                Block::Paragraph(paragraph) => text(paragraph.as_str()).size(15).into(),
                Block::ListItem { marker, depth, text: item } => row![
                    text(marker.as_str()).size(15),
                    text(item.as_str()).size(15),
                ]
                .spacing(6)
                .padding(Padding {
                    left: *depth as f32 * 16.0,
                    ..Padding::ZERO
                })
                .into(),
                Block::Quote(quote) => container(text(quote.as_str()).size(15))
                    .padding(Padding {
                        left: 12.0,
                        ..Padding::ZERO
                    })
                    .into(),
                Block::Code(code) => container(text(code.as_str()).size(14).font(Font::MONOSPACE))
                    .padding(8)
                    .width(Length::Fill)
                    .style(container::rounded_box)
                    .into(),
                Block::Rule => horizontal_rule(1).into(),
            };
            col.push(element)
        })
        .into()
}

fn bubble_border() -> Border {
    Border {
        radius: 18.0.into(),
        ..Border::default()
    }
}

fn user_bubble(_theme: &Theme) -> container::Style {
    container::Style {
        text_color: Some(Color::WHITE),
        background: Some(Color::from_rgb8(0x00, 0x7a, 0xff).into()),
        border: bubble_border(),
        ..container::Style::default()
    }
}

fn bot_bubble(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();

    container::Style {
        text_color: Some(palette.background.base.text),
        background: Some(palette.background.weak.color.into()),
        border: Border {
            width: 1.0,
            color: palette.background.strong.color,
            ..bubble_border()
        },
        ..container::Style::default()
    }
}

fn error_banner(_theme: &Theme) -> container::Style {
    container::Style {
        background: Some(Color::from_rgb8(0xff, 0xe6, 0xe6).into()),
        border: Border {
            radius: 8.0.into(),
            ..Border::default()
        },
        ..container::Style::default()
    }
}
