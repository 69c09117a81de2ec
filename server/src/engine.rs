//! Game engine coordinating clients, rooms, and broadcasts
//!
//! Every control message, stroke datagram, timer expiry, and disconnect
//! funnels through here. The engine owns the two registries and enforces the
//! locking discipline: the client lock is always taken before the room lock,
//! and neither is held across socket I/O. Outbound frames are staged in an
//! outbox while the locks are held and handed to the per-client queues after
//! release, which also fixes the ordering the protocol promises (GAME_START
//! before strokes, PAINTER_FINISH before GAME_END, GAME_END before the AI
//! verdict).

use crate::ai::AiClient;
use crate::client_manager::{ClientManager, FrameSender};
use crate::repo::Repository;
use crate::room::{Phase, RoomManager};
use chrono::Local;
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    DrawPoint, Message, ACTION_CLEAR, ACTION_REGISTER, GUESS_SECONDS, MAX_ROOMS, NO_WINNER,
    PAINT_SECONDS,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Most recent records returned for a history query.
const HISTORY_LIMIT: i64 = 50;

/// Frames staged under the registry locks and delivered after release.
#[derive(Default)]
struct Outbox(Vec<(FrameSender, Vec<u8>)>);

impl Outbox {
    fn push(&mut self, sender: FrameSender, frame: Vec<u8>) {
        self.0.push((sender, frame));
    }

    fn flush(self) {
        for (sender, frame) in self.0 {
            // A closed queue means the session is already tearing down.
            let _ = sender.send(frame);
        }
    }
}

/// AI request payload captured under the room lock. The scoring call itself
/// runs in a detached task with no locks held.
struct AiJob {
    room_id: u8,
    game_id: i32,
    target: String,
    candidates: Vec<String>,
    drawing: Vec<DrawPoint>,
}

enum Deadline {
    PaintOver,
    GuessOver,
}

pub struct Engine {
    clients: Arc<Mutex<ClientManager>>,
    rooms: Arc<Mutex<RoomManager>>,
    repo: Repository,
    ai: AiClient,
}

impl Engine {
    pub fn new(repo: Repository, ai: AiClient) -> Self {
        Self {
            clients: Arc::new(Mutex::new(ClientManager::new())),
            rooms: Arc::new(Mutex::new(RoomManager::new())),
            repo,
            ai,
        }
    }

    pub fn clients_handle(&self) -> Arc<Mutex<ClientManager>> {
        Arc::clone(&self.clients)
    }

    pub fn rooms_handle(&self) -> Arc<Mutex<RoomManager>> {
        Arc::clone(&self.rooms)
    }

    /// Claims a client slot for a freshly accepted connection.
    pub async fn register_client(&self, addr: SocketAddr, sender: FrameSender) -> Option<u8> {
        self.clients.lock().await.add_client(addr, sender)
    }

    /// Dispatches one decoded control message. Returns false when the
    /// session should close (the client asked to leave).
    pub async fn handle_message(&self, client_id: u8, msg: Message) -> bool {
        match msg {
            Message::Join { nickname } => self.set_nickname(client_id, nickname).await,
            Message::Ready => self.handle_ready(client_id).await,
            Message::PainterFinish => self.handle_painter_finish(client_id).await,
            Message::Guess { guess } => self.handle_guess(client_id, guess).await,
            Message::Leave => return false,
            Message::HistoryReq => self.handle_history_req(client_id).await,
            Message::RoomListReq => self.handle_room_list_req(client_id).await,
            Message::CreateRoom {
                room_name,
                nickname,
            } => self.handle_create_room(client_id, room_name, nickname).await,
            Message::JoinRoom { room_id, nickname } => {
                self.handle_join_room(client_id, room_id, nickname).await
            }
            Message::LeaveRoom { room_id } => self.handle_leave_room(client_id, room_id).await,
            other => {
                warn!(
                    "Unexpected {:?} from client {}",
                    other.kind(),
                    client_id
                );
            }
        }
        true
    }

    /// Frees the client slot and adjusts room membership. Safe to call for
    /// ids that are already gone.
    pub async fn handle_disconnect(&self, client_id: u8) {
        let mut clients = self.clients.lock().await;
        let Some(entry) = clients.remove_client(client_id) else {
            return;
        };
        if let Some(room_id) = entry.room_id {
            let mut rooms = self.rooms.lock().await;
            if let Some(room) = rooms.get_mut(room_id) {
                room.unseat(client_id);
            }
        }
    }

    async fn set_nickname(&self, client_id: u8, nickname: String) {
        let mut clients = self.clients.lock().await;
        if let Some(entry) = clients.get_mut(client_id) {
            info!("Client {} nickname: {}", client_id, nickname);
            entry.nickname = nickname;
        }
    }

    async fn handle_ready(&self, client_id: u8) {
        let mut outbox = Outbox::default();
        {
            let clients = self.clients.lock().await;
            let Some(room_id) = clients.get(client_id).and_then(|e| e.room_id) else {
                debug!("Client {} sent READY while not in a room", client_id);
                return;
            };
            let mut rooms = self.rooms.lock().await;
            let Some(room) = rooms.get_mut(room_id) else {
                return;
            };
            if !room.mark_ready(client_id) {
                return;
            }
            info!(
                "Room {} client {} ready ({}/{})",
                room_id, client_id, room.game.ready_count, room.game.total_clients
            );
            if room.can_start() {
                let word = self.repo.pick_word().await;
                let game_id = fresh_game_id();
                if let Some(painter_id) =
                    room.start_round(word, game_id, &mut rand::thread_rng())
                {
                    info!(
                        "Room {} game started, painter {} word {:?}",
                        room_id, painter_id, room.game.word
                    );
                    for member_id in room.member_ids() {
                        if let Some(sender) = clients.sender(member_id) {
                            let frame = Message::GameStart {
                                painter_id,
                                word: room.game.word.clone(),
                                paint_time: PAINT_SECONDS as u32,
                            }
                            .encode(member_id);
                            outbox.push(sender, frame);
                        }
                    }
                }
            }
        }
        outbox.flush();
    }

    async fn handle_painter_finish(&self, client_id: u8) {
        let room_id = {
            let clients = self.clients.lock().await;
            clients.get(client_id).and_then(|e| e.room_id)
        };
        if let Some(room_id) = room_id {
            self.begin_guessing(room_id, Some(client_id)).await;
        }
    }

    /// The PAINTING to GUESSING transition, fired by the painter's finish
    /// message or by the paint deadline (`painter` is `None` then).
    /// Broadcasts PAINTER_FINISH and schedules the one AI call of the round.
    async fn begin_guessing(&self, room_id: u8, painter: Option<u8>) {
        let mut outbox = Outbox::default();
        let mut ai_job = None;
        {
            let clients = self.clients.lock().await;
            let mut rooms = self.rooms.lock().await;
            let Some(room) = rooms.get_mut(room_id) else {
                return;
            };
            if room.game.phase != Phase::Painting {
                return;
            }
            match painter {
                Some(id) => {
                    if room.game.painter_id != Some(id) {
                        debug!(
                            "Room {} ignoring PAINTER_FINISH from non-painter {}",
                            room_id, id
                        );
                        return;
                    }
                    info!(
                        "Room {} painter {} finished, entering guessing phase",
                        room_id, id
                    );
                }
                None => info!("Room {} painting time over, entering guessing phase", room_id),
            }

            room.begin_guessing();
            let frame = Message::PainterFinish.encode(0);
            for member_id in room.member_ids() {
                if let Some(sender) = clients.sender(member_id) {
                    outbox.push(sender, frame.clone());
                }
            }

            // The request payload is captured here, under the lock; the
            // socket work happens in a detached task without it.
            match self.repo.list_candidates().await {
                Ok(candidates) if !candidates.is_empty() => {
                    ai_job = Some(AiJob {
                        room_id,
                        game_id: room.game.game_id,
                        target: room.game.word.clone(),
                        candidates,
                        drawing: room.strokes.clone(),
                    });
                }
                Ok(_) => warn!("Room {} has no AI candidates, skipping scoring", room_id),
                Err(e) => warn!("Candidate list unavailable, skipping AI scoring: {}", e),
            }
        }
        outbox.flush();
        if let Some(job) = ai_job {
            self.spawn_ai_job(job);
        }
    }

    fn spawn_ai_job(&self, job: AiJob) {
        let ai = self.ai.clone();
        let rooms = Arc::clone(&self.rooms);
        tokio::spawn(async move {
            match ai.score(&job.target, &job.candidates, &job.drawing).await {
                Ok(outcome) => {
                    let mut rooms = rooms.lock().await;
                    let Some(room) = rooms.get_mut(job.room_id) else {
                        return;
                    };
                    // Park only for the round it was scored for; anything
                    // later is stale and dropped.
                    if room.game.phase == Phase::Guessing && room.game.game_id == job.game_id {
                        info!(
                            "Room {} AI predicted {:?} (score {}, correct {})",
                            job.room_id, outcome.predicted_word, outcome.score, outcome.is_correct
                        );
                        room.parked_ai = Some(outcome);
                    } else {
                        debug!("Room {} dropping stale AI result", job.room_id);
                    }
                }
                Err(e) => warn!("Room {} AI scoring failed: {}", job.room_id, e),
            }
        });
    }

    async fn handle_guess(&self, client_id: u8, guess: String) {
        let mut finished_room = None;
        {
            let clients = self.clients.lock().await;
            let Some(room_id) = clients.get(client_id).and_then(|e| e.room_id) else {
                return;
            };
            let mut rooms = self.rooms.lock().await;
            let Some(room) = rooms.get_mut(room_id) else {
                return;
            };
            if !room.record_guess(client_id, &guess) {
                debug!("Room {} ignoring guess from client {}", room_id, client_id);
                return;
            }
            info!("Room {} client {} guessed {:?}", room_id, client_id, guess);
            if room.all_non_painters_guessed() {
                finished_room = Some(room_id);
            }
        }
        if let Some(room_id) = finished_room {
            self.end_round(room_id).await;
        }
    }

    /// The GUESSING to FINISHED transition: winner decision, GAME_END
    /// broadcast, then the parked AI verdict if one arrived, then history
    /// persistence, then back to WAITING with membership intact.
    async fn end_round(&self, room_id: u8) {
        let mut outbox = Outbox::default();
        {
            let clients = self.clients.lock().await;
            let mut rooms = self.rooms.lock().await;
            let Some(room) = rooms.get_mut(room_id) else {
                return;
            };
            if room.game.phase != Phase::Guessing {
                return;
            }
            room.game.phase = Phase::Finished;

            let (winner_id, guess_count) = room.decide_winner();
            let end_frame = Message::GameEnd {
                correct_word: room.game.word.clone(),
                winner_id,
                guess_count,
            }
            .encode(0);
            let ai_frame = room.parked_ai.take().map(|outcome| {
                Message::AiGuessResult {
                    predicted_word: outcome.predicted_word,
                    score: outcome.score,
                    is_correct: outcome.is_correct,
                }
                .encode(0)
            });

            for member_id in room.member_ids() {
                if let Some(sender) = clients.sender(member_id) {
                    outbox.push(sender.clone(), end_frame.clone());
                    if let Some(frame) = &ai_frame {
                        outbox.push(sender, frame.clone());
                    }
                }
            }

            if winner_id != NO_WINNER {
                info!(
                    "Room {} game over, answer {:?}, winner client {}",
                    room_id, room.game.word, winner_id
                );
            } else {
                info!(
                    "Room {} game over, answer {:?}, nobody guessed it",
                    room_id, room.game.word
                );
            }

            let time_str = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            let game_id = room.game.game_id;
            let word = room.game.word.clone();
            let records: Vec<(String, String)> = room
                .members()
                .map(|member| {
                    let guess_or_role = if member.is_painter {
                        "(Painter)".to_string()
                    } else if member.has_guessed {
                        member.guess.clone()
                    } else {
                        "(No Guess)".to_string()
                    };
                    let nickname = clients
                        .get(member.client_id)
                        .map(|e| e.nickname.clone())
                        .unwrap_or_default();
                    (nickname, guess_or_role)
                })
                .collect();
            for (nickname, guess_or_role) in &records {
                if let Err(e) = self
                    .repo
                    .append_history(game_id, &word, nickname, guess_or_role, &time_str)
                    .await
                {
                    warn!(
                        "Room {} history insert failed for {:?}: {}",
                        room_id, nickname, e
                    );
                }
            }

            room.reset_round();
        }
        outbox.flush();
    }

    async fn handle_history_req(&self, client_id: u8) {
        let (nickname, sender) = {
            let clients = self.clients.lock().await;
            match clients.get(client_id) {
                Some(entry) => (entry.nickname.clone(), entry.sender.clone()),
                None => return,
            }
        };
        info!("Client {} requested history", client_id);

        let records = match self.repo.list_history(&nickname, HISTORY_LIMIT).await {
            Ok(records) => records,
            Err(e) => {
                warn!("History query failed for {:?}: {}", nickname, e);
                Vec::new()
            }
        };
        for record in records {
            let frame = Message::HistoryData {
                game_id: record.game_id,
                word: record.word,
                user_guess: record.user_guess,
                game_time: record.game_time,
            }
            .encode(0);
            let _ = sender.send(frame);
        }
        let _ = sender.send(Message::HistoryEnd.encode(0));
    }

    async fn handle_room_list_req(&self, client_id: u8) {
        let sender = {
            let clients = self.clients.lock().await;
            match clients.sender(client_id) {
                Some(sender) => sender,
                None => return,
            }
        };
        let rooms = self.rooms.lock().await.list();
        let _ = sender.send(Message::RoomList { rooms }.encode(0));
    }

    async fn handle_create_room(&self, client_id: u8, room_name: String, nickname: String) {
        let mut outbox = Outbox::default();
        {
            let mut clients = self.clients.lock().await;
            let Some(entry) = clients.get_mut(client_id) else {
                return;
            };
            let sender = entry.sender.clone();
            if entry.room_id.is_some() {
                // A client occupies at most one room; no implicit hopping.
                warn!(
                    "Client {} tried to create a room while already in one",
                    client_id
                );
                outbox.push(sender, Message::Error.encode(client_id));
            } else {
                let mut rooms = self.rooms.lock().await;
                match rooms.create(&room_name, client_id) {
                    Some(room_id) => {
                        entry.nickname = nickname.clone();
                        entry.room_id = Some(room_id);
                        let num_players = rooms
                            .get(room_id)
                            .map(|room| room.member_count() as u8)
                            .unwrap_or(1);
                        info!(
                            "Client {} created room {}: {:?}",
                            client_id, room_id, room_name
                        );
                        outbox.push(
                            sender,
                            Message::RoomCreated {
                                room_id,
                                room_name,
                                nickname,
                                num_players,
                            }
                            .encode(0),
                        );
                    }
                    None => {
                        info!("Client {} could not create a room: no free slot", client_id);
                        outbox.push(sender, Message::Error.encode(client_id));
                    }
                }
            }
        }
        outbox.flush();
    }

    async fn handle_join_room(&self, client_id: u8, room_id: u8, nickname: String) {
        let mut outbox = Outbox::default();
        {
            let mut clients = self.clients.lock().await;
            let Some(entry) = clients.get_mut(client_id) else {
                return;
            };
            let sender = entry.sender.clone();
            if entry.room_id.is_some() {
                warn!(
                    "Client {} tried to join room {} while already in one",
                    client_id, room_id
                );
                outbox.push(sender, Message::Error.encode(client_id));
            } else {
                let mut rooms = self.rooms.lock().await;
                let seated = match rooms.get_mut(room_id) {
                    Some(room) => {
                        if !room.is_free() && room.seat(client_id) {
                            Some((room.name.clone(), room.member_count() as u8))
                        } else {
                            None
                        }
                    }
                    None => None,
                };
                match seated {
                    Some((room_name, num_players)) => {
                        entry.nickname = nickname.clone();
                        entry.room_id = Some(room_id);
                        info!(
                            "Client {} joined room {}: {:?}",
                            client_id, room_id, room_name
                        );
                        outbox.push(
                            sender,
                            Message::RoomJoined {
                                room_id,
                                room_name,
                                nickname,
                                num_players,
                            }
                            .encode(0),
                        );
                    }
                    None => {
                        info!(
                            "Client {} could not join room {} (missing or full)",
                            client_id, room_id
                        );
                        outbox.push(sender, Message::Error.encode(client_id));
                    }
                }
            }
        }
        outbox.flush();
    }

    async fn handle_leave_room(&self, client_id: u8, room_id: u8) {
        let mut outbox = Outbox::default();
        {
            let mut clients = self.clients.lock().await;
            let Some(entry) = clients.get_mut(client_id) else {
                return;
            };
            let sender = entry.sender.clone();
            if entry.room_id == Some(room_id) {
                entry.room_id = None;
                let mut rooms = self.rooms.lock().await;
                if let Some(room) = rooms.get_mut(room_id) {
                    room.unseat(client_id);
                    info!(
                        "Client {} left room {} ({} players remain)",
                        client_id,
                        room_id,
                        room.member_count()
                    );
                }
            }
            // Stale or unknown room ids still get the acknowledgement.
            outbox.push(sender, Message::RoomLeft { room_id }.encode(0));
        }
        outbox.flush();
    }

    /// Processes one PAINT_DATA datagram and returns the peers it should be
    /// forwarded to. Every datagram latches the sender's return address;
    /// registration beacons and unknown actions go no further. Strokes are
    /// only honored from the room's painter while PAINTING, except the
    /// canvas clear which also passes during GUESSING.
    pub async fn handle_paint_datagram(
        &self,
        from: SocketAddr,
        client_id: u8,
        x: u16,
        y: u16,
        action: u8,
        rgb: (u8, u8, u8),
    ) -> Vec<SocketAddr> {
        let mut clients = self.clients.lock().await;
        let Some(entry) = clients.get_mut(client_id) else {
            return Vec::new();
        };
        entry.udp_addr = Some(from);
        let Some(room_id) = entry.room_id else {
            return Vec::new();
        };

        if action == ACTION_REGISTER || action > ACTION_CLEAR {
            return Vec::new();
        }

        let mut rooms = self.rooms.lock().await;
        let Some(room) = rooms.get_mut(room_id) else {
            return Vec::new();
        };
        if room.game.painter_id != Some(client_id) {
            return Vec::new();
        }
        let painting = room.game.phase == Phase::Painting;
        if !painting && action != ACTION_CLEAR {
            return Vec::new();
        }

        if painting {
            room.record_stroke(DrawPoint { x, y, action });
            let timestamp = unix_seconds();
            if let Err(e) = self
                .repo
                .append_drawing(room.game.game_id, x, y, action, rgb.0, rgb.1, rgb.2, timestamp)
                .await
            {
                warn!("Stroke telemetry insert failed: {}", e);
            }
        }

        room.member_ids()
            .into_iter()
            .filter(|&id| id != client_id)
            .filter_map(|id| clients.get(id).and_then(|peer| peer.udp_addr))
            .collect()
    }

    /// One pass of the deadline ticker. Expiry checks run under a short
    /// room-lock scope; the transitions themselves revalidate the phase, so
    /// racing a message-driven transition is harmless.
    pub async fn check_deadlines(&self) {
        for room_id in 0..MAX_ROOMS as u8 {
            let due = {
                let rooms = self.rooms.lock().await;
                match rooms.get(room_id) {
                    Some(room) => match room.game.phase {
                        Phase::Painting
                            if elapsed_secs(room.game.paint_started) >= PAINT_SECONDS =>
                        {
                            Some(Deadline::PaintOver)
                        }
                        Phase::Guessing
                            if elapsed_secs(room.game.guess_started) >= GUESS_SECONDS =>
                        {
                            Some(Deadline::GuessOver)
                        }
                        _ => None,
                    },
                    None => None,
                }
            };
            match due {
                Some(Deadline::PaintOver) => self.begin_guessing(room_id, None).await,
                Some(Deadline::GuessOver) => self.end_round(room_id).await,
                None => {}
            }
        }
    }
}

fn elapsed_secs(started: Option<Instant>) -> u64 {
    started.map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs() as i64
}

/// Round tag recorded with history rows. Wall-clock seconds mixed with a
/// random component, continuing the scheme of the data already on disk.
fn fresh_game_id() -> i32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs() as i32;
    secs.wrapping_add(rand::thread_rng().gen_range(0..0x7fff))
}
