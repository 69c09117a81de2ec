//! Room registry and per-room game state machine
//!
//! A room seats up to `MAX_CLIENTS` members and embeds one game. The game
//! walks WAITING -> READY -> PAINTING -> GUESSING -> FINISHED and snaps back
//! to WAITING with membership intact. Everything here is plain state with
//! synchronous transitions; the engine decides when to call in and what to
//! broadcast afterwards, which keeps the machine itself unit-testable.
//!
//! Per-round member flags (ready, painter, submitted guess) live on the
//! room's member slots, not in the client registry, and are wiped on every
//! round boundary. The client registry stays the single source of identity.

use log::info;
use rand::Rng;
use shared::{DrawPoint, RoomInfo, MAX_CLIENTS, MAX_DRAWING_POINTS, MAX_ROOMS, NO_WINNER};
use std::time::Instant;

use crate::ai::AiOutcome;

/// Phases of one room's game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    Ready,
    Painting,
    Guessing,
    Finished,
}

/// One seated member and their per-round flags.
#[derive(Debug)]
pub struct Member {
    pub client_id: u8,
    pub ready: bool,
    pub is_painter: bool,
    pub has_guessed: bool,
    pub guess: String,
}

impl Member {
    fn new(client_id: u8) -> Self {
        Self {
            client_id,
            ready: false,
            is_painter: false,
            has_guessed: false,
            guess: String::new(),
        }
    }
}

/// The game embedded in a room.
#[derive(Debug)]
pub struct GameInfo {
    pub phase: Phase,
    pub painter_id: Option<u8>,
    pub word: String,
    pub ready_count: u8,
    pub total_clients: u8,
    pub paint_started: Option<Instant>,
    pub guess_started: Option<Instant>,
    pub game_id: i32,
}

impl GameInfo {
    fn new() -> Self {
        Self {
            phase: Phase::Waiting,
            painter_id: None,
            word: String::new(),
            ready_count: 0,
            total_clients: 0,
            paint_started: None,
            guess_started: None,
            game_id: 0,
        }
    }
}

/// A room slot. A room whose name is empty is free.
#[derive(Debug)]
pub struct Room {
    pub id: u8,
    pub name: String,
    members: [Option<Member>; MAX_CLIENTS],
    pub game: GameInfo,
    /// Stroke history recorded for AI scoring, reset each round.
    pub strokes: Vec<DrawPoint>,
    /// AI outcome received during GUESSING, held back until after GAME_END.
    pub parked_ai: Option<AiOutcome>,
}

impl Room {
    fn new(id: u8) -> Self {
        Self {
            id,
            name: String::new(),
            members: std::array::from_fn(|_| None),
            game: GameInfo::new(),
            strokes: Vec::new(),
            parked_ai: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.name.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.members.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn member(&self, client_id: u8) -> Option<&Member> {
        self.members
            .iter()
            .filter_map(Option::as_ref)
            .find(|member| member.client_id == client_id)
    }

    pub fn member_mut(&mut self, client_id: u8) -> Option<&mut Member> {
        self.members
            .iter_mut()
            .filter_map(Option::as_mut)
            .find(|member| member.client_id == client_id)
    }

    /// Member ids in slot order.
    pub fn member_ids(&self) -> Vec<u8> {
        self.members
            .iter()
            .filter_map(Option::as_ref)
            .map(|member| member.client_id)
            .collect()
    }

    /// Members in slot order, for round-end bookkeeping.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter_map(Option::as_ref)
    }

    /// Seats a client in the lowest free member slot.
    pub fn seat(&mut self, client_id: u8) -> bool {
        if self.member(client_id).is_some() {
            return false;
        }
        for slot in self.members.iter_mut() {
            if slot.is_none() {
                *slot = Some(Member::new(client_id));
                self.game.total_clients += 1;
                return true;
            }
        }
        false
    }

    /// Removes a member, adjusting the ready count. The room closes when the
    /// last member leaves. Returns false for ids that were never seated.
    pub fn unseat(&mut self, client_id: u8) -> bool {
        let found = self
            .members
            .iter()
            .position(|slot| matches!(slot, Some(member) if member.client_id == client_id));
        let Some(index) = found else {
            return false;
        };

        if let Some(member) = self.members[index].take() {
            if member.ready {
                self.game.ready_count = self.game.ready_count.saturating_sub(1);
            }
        }
        self.game.total_clients = self.game.total_clients.saturating_sub(1);
        if self.member_count() == 0 {
            self.close();
        }
        true
    }

    /// Frees the slot: clears the name and resets all game state.
    fn close(&mut self) {
        info!("Room {} is empty, closing", self.id);
        self.name.clear();
        self.game = GameInfo::new();
        self.strokes.clear();
        self.parked_ai = None;
    }

    /// Handles a READY from a member. Returns true when it counted.
    ///
    /// Ignored outside WAITING/READY, for non-members, and for members that
    /// are already ready.
    pub fn mark_ready(&mut self, client_id: u8) -> bool {
        if !matches!(self.game.phase, Phase::Waiting | Phase::Ready) {
            return false;
        }
        match self.member_mut(client_id) {
            Some(member) if !member.ready => member.ready = true,
            _ => return false,
        }
        self.game.ready_count += 1;
        if self.game.phase == Phase::Waiting {
            self.game.phase = Phase::Ready;
        }
        true
    }

    /// A round may start once everyone seated is ready and there are at
    /// least two members.
    pub fn can_start(&self) -> bool {
        self.game.phase == Phase::Ready
            && self.game.ready_count == self.game.total_clients
            && self.game.total_clients >= 2
    }

    /// Starts a round: picks the painter uniformly over the seated members,
    /// installs the word, and arms the paint deadline. Returns the painter's
    /// client id, or `None` when the start conditions no longer hold.
    pub fn start_round(&mut self, word: String, game_id: i32, rng: &mut impl Rng) -> Option<u8> {
        if !self.can_start() {
            return None;
        }

        let occupied: Vec<usize> = self
            .members
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| i)
            .collect();
        let pick = occupied[rng.gen_range(0..occupied.len())];
        let painter_id = self.members[pick].as_ref().map(|m| m.client_id)?;
        if let Some(member) = self.members[pick].as_mut() {
            member.is_painter = true;
        }

        self.game.painter_id = Some(painter_id);
        self.game.word = word;
        self.game.game_id = game_id;
        self.game.phase = Phase::Painting;
        self.game.paint_started = Some(Instant::now());
        self.game.guess_started = None;
        self.strokes.clear();
        self.parked_ai = None;
        Some(painter_id)
    }

    /// Moves PAINTING into GUESSING and arms the guess deadline.
    pub fn begin_guessing(&mut self) {
        self.game.phase = Phase::Guessing;
        self.game.guess_started = Some(Instant::now());
    }

    /// Records a guess. Accepted only during GUESSING, from a seated
    /// non-painter that has not guessed yet. The guess is kept verbatim;
    /// correctness is decided at round end.
    pub fn record_guess(&mut self, client_id: u8, guess: &str) -> bool {
        if self.game.phase != Phase::Guessing {
            return false;
        }
        match self.member_mut(client_id) {
            Some(member) if !member.is_painter && !member.has_guessed => {
                member.guess = guess.to_string();
                member.has_guessed = true;
                true
            }
            _ => false,
        }
    }

    /// True once every seated non-painter has a guess on record.
    pub fn all_non_painters_guessed(&self) -> bool {
        self.members()
            .filter(|member| !member.is_painter)
            .all(|member| member.has_guessed)
    }

    /// Winner decision: the lowest member slot whose guess matches the word
    /// byte-for-byte wins; `NO_WINNER` otherwise. The second value counts
    /// all guesses submitted this round.
    pub fn decide_winner(&self) -> (u8, u8) {
        let mut winner = NO_WINNER;
        let mut guess_count = 0u8;
        for member in self.members() {
            if member.has_guessed {
                guess_count += 1;
                if winner == NO_WINNER && member.guess == self.game.word {
                    winner = member.client_id;
                }
            }
        }
        (winner, guess_count)
    }

    /// Clears round state while keeping membership, returning the room to
    /// WAITING for the next round.
    pub fn reset_round(&mut self) {
        self.game.phase = Phase::Waiting;
        self.game.painter_id = None;
        self.game.word.clear();
        self.game.ready_count = 0;
        self.game.paint_started = None;
        self.game.guess_started = None;
        for member in self.members.iter_mut().filter_map(Option::as_mut) {
            member.ready = false;
            member.is_painter = false;
            member.has_guessed = false;
            member.guess.clear();
        }
    }

    /// Appends a stroke to the round's history. Points past the cap are
    /// dropped from the record but still reach peers.
    pub fn record_stroke(&mut self, point: DrawPoint) {
        if self.strokes.len() < MAX_DRAWING_POINTS {
            self.strokes.push(point);
        }
    }
}

/// The fixed table of room slots.
pub struct RoomManager {
    rooms: [Room; MAX_ROOMS],
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: std::array::from_fn(|i| Room::new(i as u8)),
        }
    }

    /// Allocates the lowest free room slot under `name` and seats the
    /// creator. Returns `None` when every slot is taken or the name is
    /// empty (an empty name would leave the slot looking free).
    pub fn create(&mut self, name: &str, creator_id: u8) -> Option<u8> {
        if name.is_empty() {
            return None;
        }
        for room in self.rooms.iter_mut() {
            if room.is_free() {
                room.name = name.to_string();
                room.seat(creator_id);
                info!("Room {} created: {}", room.id, room.name);
                return Some(room.id);
            }
        }
        None
    }

    pub fn get(&self, room_id: u8) -> Option<&Room> {
        self.rooms.get(room_id as usize)
    }

    pub fn get_mut(&mut self, room_id: u8) -> Option<&mut Room> {
        self.rooms.get_mut(room_id as usize)
    }

    /// Snapshot of the open rooms for ROOM_LIST.
    pub fn list(&self) -> Vec<RoomInfo> {
        self.rooms
            .iter()
            .filter(|room| !room.is_free())
            .map(|room| RoomInfo {
                room_id: room.id,
                name: room.name.clone(),
                num_players: room.member_count() as u8,
            })
            .collect()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn room_with_members(ids: &[u8]) -> Room {
        let mut room = Room::new(0);
        room.name = "test".to_string();
        for &id in ids {
            assert!(room.seat(id));
        }
        room
    }

    fn ready_room(ids: &[u8]) -> Room {
        let mut room = room_with_members(ids);
        for &id in ids {
            assert!(room.mark_ready(id));
        }
        room
    }

    #[test]
    fn seat_and_unseat_track_counts() {
        let mut room = room_with_members(&[0, 1, 2]);
        assert_eq!(room.member_count(), 3);
        assert_eq!(room.game.total_clients, 3);

        assert!(room.unseat(1));
        assert_eq!(room.member_count(), 2);
        assert_eq!(room.game.total_clients, 2);

        // Stale id is a no-op.
        assert!(!room.unseat(1));
        assert_eq!(room.game.total_clients, 2);
    }

    #[test]
    fn double_seat_rejected() {
        let mut room = room_with_members(&[4]);
        assert!(!room.seat(4));
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn ready_moves_waiting_to_ready() {
        let mut room = room_with_members(&[0, 1]);
        assert_eq!(room.game.phase, Phase::Waiting);

        assert!(room.mark_ready(0));
        assert_eq!(room.game.phase, Phase::Ready);
        assert_eq!(room.game.ready_count, 1);

        // A second READY from the same member does not count twice.
        assert!(!room.mark_ready(0));
        assert_eq!(room.game.ready_count, 1);
    }

    #[test]
    fn ready_from_non_member_ignored() {
        let mut room = room_with_members(&[0]);
        assert!(!room.mark_ready(9));
        assert_eq!(room.game.ready_count, 0);
    }

    #[test]
    fn solo_room_cannot_start() {
        let mut room = room_with_members(&[3]);
        assert!(room.mark_ready(3));
        assert!(!room.can_start());

        let mut rng = StdRng::seed_from_u64(1);
        assert!(room.start_round("apple".into(), 7, &mut rng).is_none());
        assert_eq!(room.game.phase, Phase::Ready);
    }

    #[test]
    fn start_round_assigns_single_painter() {
        let mut room = ready_room(&[0, 1, 2]);
        assert!(room.can_start());

        let mut rng = StdRng::seed_from_u64(42);
        let painter = room.start_round("apple".into(), 7, &mut rng).unwrap();

        assert_eq!(room.game.phase, Phase::Painting);
        assert_eq!(room.game.painter_id, Some(painter));
        assert_eq!(room.game.word, "apple");
        assert_eq!(room.game.game_id, 7);
        assert!(room.game.paint_started.is_some());
        assert_eq!(
            room.members().filter(|m| m.is_painter).count(),
            1,
            "exactly one painter"
        );
    }

    #[test]
    fn painter_selection_is_uniform() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0u32; 3];
        let rounds = 3000;

        for _ in 0..rounds {
            let mut room = ready_room(&[0, 1, 2]);
            let painter = room.start_round("apple".into(), 1, &mut rng).unwrap();
            counts[painter as usize] += 1;
        }

        // Each member should land near rounds/3; allow a generous band.
        for (id, &count) in counts.iter().enumerate() {
            assert!(
                (800..=1200).contains(&count),
                "member {} picked {} times out of {}",
                id,
                count,
                rounds
            );
        }
    }

    #[test]
    fn guess_authorization() {
        let mut room = ready_room(&[0, 1]);
        let mut rng = StdRng::seed_from_u64(3);
        let painter = room.start_round("apple".into(), 1, &mut rng).unwrap();
        let guesser = if painter == 0 { 1 } else { 0 };

        // Still PAINTING: nothing accepted.
        assert!(!room.record_guess(guesser, "apple"));

        room.begin_guessing();

        assert!(!room.record_guess(painter, "apple"), "painter cannot guess");
        assert!(room.record_guess(guesser, "apple"));
        assert!(
            !room.record_guess(guesser, "banana"),
            "second guess rejected"
        );
        assert_eq!(room.member(guesser).unwrap().guess, "apple");
    }

    #[test]
    fn winner_is_lowest_matching_slot() {
        let mut room = ready_room(&[0, 1, 2, 3]);
        let mut rng = StdRng::seed_from_u64(11);
        let painter = room.start_round("apple".into(), 1, &mut rng).unwrap();
        room.begin_guessing();

        for id in [0, 1, 2, 3] {
            if id != painter {
                assert!(room.record_guess(id, "apple"));
            }
        }

        let (winner, count) = room.decide_winner();
        let expected = (0..4).find(|&id| id != painter).unwrap();
        assert_eq!(winner, expected);
        assert_eq!(count, 3);
    }

    #[test]
    fn no_correct_guess_means_no_winner() {
        let mut room = ready_room(&[0, 1]);
        let mut rng = StdRng::seed_from_u64(5);
        let painter = room.start_round("apple".into(), 1, &mut rng).unwrap();
        let guesser = if painter == 0 { 1 } else { 0 };
        room.begin_guessing();

        assert!(room.record_guess(guesser, "banana"));
        let (winner, count) = room.decide_winner();
        assert_eq!(winner, NO_WINNER);
        assert_eq!(count, 1);
    }

    #[test]
    fn winner_comparison_is_exact_bytes() {
        let mut room = ready_room(&[0, 1]);
        let mut rng = StdRng::seed_from_u64(5);
        let painter = room.start_round("apple".into(), 1, &mut rng).unwrap();
        let guesser = if painter == 0 { 1 } else { 0 };
        room.begin_guessing();

        assert!(room.record_guess(guesser, "Apple"));
        assert_eq!(room.decide_winner().0, NO_WINNER);
    }

    #[test]
    fn all_non_painters_guessed_gate() {
        let mut room = ready_room(&[0, 1, 2]);
        let mut rng = StdRng::seed_from_u64(9);
        let painter = room.start_round("apple".into(), 1, &mut rng).unwrap();
        room.begin_guessing();

        let guessers: Vec<u8> = [0, 1, 2].into_iter().filter(|&id| id != painter).collect();
        assert!(room.record_guess(guessers[0], "car"));
        assert!(!room.all_non_painters_guessed());
        assert!(room.record_guess(guessers[1], "apple"));
        assert!(room.all_non_painters_guessed());
    }

    #[test]
    fn reset_round_keeps_membership() {
        let mut room = ready_room(&[0, 1]);
        let mut rng = StdRng::seed_from_u64(2);
        let painter = room.start_round("apple".into(), 1, &mut rng).unwrap();
        room.begin_guessing();
        let guesser = if painter == 0 { 1 } else { 0 };
        room.record_guess(guesser, "apple");

        room.reset_round();

        assert_eq!(room.game.phase, Phase::Waiting);
        assert_eq!(room.game.painter_id, None);
        assert!(room.game.word.is_empty());
        assert_eq!(room.game.ready_count, 0);
        assert_eq!(room.member_count(), 2);
        for member in room.members() {
            assert!(!member.ready);
            assert!(!member.is_painter);
            assert!(!member.has_guessed);
            assert!(member.guess.is_empty());
        }
    }

    #[test]
    fn last_leave_closes_room() {
        let mut room = room_with_members(&[0, 1]);
        room.unseat(0);
        assert!(!room.is_free());

        room.unseat(1);
        assert!(room.is_free());
        assert_eq!(room.game.phase, Phase::Waiting);
        assert_eq!(room.game.total_clients, 0);
    }

    #[test]
    fn leaving_ready_member_adjusts_ready_count() {
        let mut room = room_with_members(&[0, 1, 2]);
        room.mark_ready(0);
        room.mark_ready(1);
        assert_eq!(room.game.ready_count, 2);

        room.unseat(0);
        assert_eq!(room.game.ready_count, 1);
        assert_eq!(room.game.total_clients, 2);
    }

    #[test]
    fn stroke_history_is_bounded() {
        let mut room = room_with_members(&[0]);
        for i in 0..(MAX_DRAWING_POINTS + 100) {
            room.record_stroke(DrawPoint {
                x: i as u16,
                y: 0,
                action: 2,
            });
        }
        assert_eq!(room.strokes.len(), MAX_DRAWING_POINTS);
    }

    #[test]
    fn manager_allocates_and_refuses_when_full() {
        let mut manager = RoomManager::new();
        for i in 0..MAX_ROOMS {
            let id = manager.create(&format!("room {}", i), i as u8);
            assert_eq!(id, Some(i as u8));
        }
        assert_eq!(manager.create("one too many", 0), None);
        assert_eq!(manager.list().len(), MAX_ROOMS);
    }

    #[test]
    fn manager_rejects_empty_name() {
        let mut manager = RoomManager::new();
        assert_eq!(manager.create("", 0), None);
    }

    #[test]
    fn manager_reuses_closed_slot() {
        let mut manager = RoomManager::new();
        let id = manager.create("short-lived", 3).unwrap();
        manager.get_mut(id).unwrap().unseat(3);
        assert!(manager.get(id).unwrap().is_free());

        assert_eq!(manager.create("replacement", 4), Some(id));
        assert_eq!(manager.list().len(), 1);
    }
}
