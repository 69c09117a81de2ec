//! # Shared Wire Protocol
//!
//! This crate defines the wire protocol spoken between the draw-and-guess
//! server and its clients. Both transports use the same framing: a 4-byte
//! header (`type: u8`, `client_id: u8`, `data_len: u16` little-endian)
//! followed by `data_len` bytes of fixed-width body. The reliable TCP stream
//! carries control messages (rooms, readiness, guesses, history); the UDP
//! socket carries `PAINT_DATA` stroke datagrams and the registration beacon.
//!
//! ## Layout rules
//!
//! - Integers are fixed-width little-endian.
//! - Strings occupy a fixed width, are NUL-terminated within it, and the
//!   remainder is zero-padded. Text is UTF-8; guesses are compared
//!   byte-for-byte by the server, so no normalization happens here.
//! - `data_len` covers the body only, never the header.
//! - The room list always encodes its full fixed table of [`MAX_ROOMS`]
//!   entries; `num_rooms` says how many are meaningful.
//!
//! Decoding is strict: a body whose length does not match its message type
//! is rejected, as is any unknown type. The server treats a decode failure
//! on the stream as fatal to that session and drops bad datagrams.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default port, bound once for TCP and once for UDP.
pub const SERVER_PORT: u16 = 1234;

/// Maximum concurrent client connections.
pub const MAX_CLIENTS: usize = 10;

/// Maximum concurrent rooms.
pub const MAX_ROOMS: usize = 10;

/// Cap on the per-round stroke history kept for AI scoring. Strokes beyond
/// this are still forwarded to peers, just not recorded.
pub const MAX_DRAWING_POINTS: usize = 4096;

/// Painting phase deadline in seconds.
pub const PAINT_SECONDS: u64 = 60;

/// Guessing phase deadline in seconds.
pub const GUESS_SECONDS: u64 = 30;

/// Sentinel `winner_id` meaning nobody guessed the word.
pub const NO_WINNER: u8 = 255;

/// Fixed widths of the string fields, terminator included.
pub const NICKNAME_LEN: usize = 32;
pub const WORD_LEN: usize = 32;
pub const GUESS_LEN: usize = 64;
pub const ROOM_NAME_LEN: usize = 32;
pub const TIME_LEN: usize = 32;

/// Size of the frame header on both transports.
pub const HEADER_LEN: usize = 4;

/// Stroke actions carried in the `action` byte of `PAINT_DATA`.
///
/// `ACTION_REGISTER` is the registration beacon a client sends after
/// learning its id so the server can latch the datagram return address; it
/// is never drawn, recorded, or forwarded.
pub const ACTION_REGISTER: u8 = 0;
pub const ACTION_PRESS: u8 = 1;
pub const ACTION_MOVE: u8 = 2;
pub const ACTION_CLEAR: u8 = 3;

const JOIN_BODY_LEN: usize = NICKNAME_LEN;
const GAME_START_BODY_LEN: usize = 1 + WORD_LEN + 4;
const PAINT_DATA_BODY_LEN: usize = 8;
const GUESS_BODY_LEN: usize = GUESS_LEN;
const GAME_END_BODY_LEN: usize = WORD_LEN + 2;
const HISTORY_DATA_BODY_LEN: usize = 4 + WORD_LEN + GUESS_LEN + TIME_LEN;
const ROOM_INFO_LEN: usize = 1 + ROOM_NAME_LEN + 1;
const ROOM_LIST_BODY_LEN: usize = 1 + MAX_ROOMS * ROOM_INFO_LEN;
const CREATE_ROOM_BODY_LEN: usize = ROOM_NAME_LEN + NICKNAME_LEN;
const JOIN_ROOM_BODY_LEN: usize = 1 + NICKNAME_LEN;
const LEAVE_ROOM_BODY_LEN: usize = 1;
const ROOM_CREATED_BODY_LEN: usize = 1 + ROOM_NAME_LEN + NICKNAME_LEN + 1;
const ROOM_LEFT_BODY_LEN: usize = 1;
const AI_RESULT_BODY_LEN: usize = WORD_LEN + 2;

/// Largest legal frame on either transport (the room list plus header).
pub const MAX_FRAME_LEN: usize = HEADER_LEN + ROOM_LIST_BODY_LEN;

/// Errors produced while decoding a frame. Any of these is a malformed
/// frame from the server's point of view.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("message body has {got} bytes, expected {expected}")]
    Length { expected: usize, got: usize },
    #[error("unknown message type {0}")]
    UnknownKind(u8),
    #[error("text field is not valid UTF-8")]
    BadString,
    #[error("field value out of range")]
    BadValue,
}

/// Message type codes as they appear in the header's first byte.
///
/// The numbering is part of the protocol and must not change. Code 21 was
/// reserved for a client-side AI request that never shipped; it decodes as
/// an unknown type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgKind {
    ClientJoin = 1,
    ClientReady = 2,
    GameStart = 3,
    PaintData = 4,
    GuessSubmit = 5,
    GameEnd = 6,
    ClientLeave = 7,
    Error = 8,
    PainterFinish = 9,
    HistoryReq = 10,
    HistoryData = 11,
    HistoryEnd = 12,
    RoomListReq = 13,
    RoomList = 14,
    CreateRoom = 15,
    JoinRoom = 16,
    LeaveRoom = 17,
    RoomCreated = 18,
    RoomJoined = 19,
    RoomLeft = 20,
    AiGuessResult = 22,
}

impl MsgKind {
    pub fn from_u8(value: u8) -> Option<MsgKind> {
        match value {
            1 => Some(MsgKind::ClientJoin),
            2 => Some(MsgKind::ClientReady),
            3 => Some(MsgKind::GameStart),
            4 => Some(MsgKind::PaintData),
            5 => Some(MsgKind::GuessSubmit),
            6 => Some(MsgKind::GameEnd),
            7 => Some(MsgKind::ClientLeave),
            8 => Some(MsgKind::Error),
            9 => Some(MsgKind::PainterFinish),
            10 => Some(MsgKind::HistoryReq),
            11 => Some(MsgKind::HistoryData),
            12 => Some(MsgKind::HistoryEnd),
            13 => Some(MsgKind::RoomListReq),
            14 => Some(MsgKind::RoomList),
            15 => Some(MsgKind::CreateRoom),
            16 => Some(MsgKind::JoinRoom),
            17 => Some(MsgKind::LeaveRoom),
            18 => Some(MsgKind::RoomCreated),
            19 => Some(MsgKind::RoomJoined),
            20 => Some(MsgKind::RoomLeft),
            22 => Some(MsgKind::AiGuessResult),
            _ => None,
        }
    }
}

/// The 4-byte header leading every frame on both transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: u8,
    pub client_id: u8,
    pub data_len: u16,
}

impl FrameHeader {
    /// Parses a header from the front of `buf`.
    pub fn parse(buf: &[u8]) -> Result<FrameHeader, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::Length {
                expected: HEADER_LEN,
                got: buf.len(),
            });
        }
        Ok(FrameHeader {
            kind: buf[0],
            client_id: buf[1],
            data_len: u16::from_le_bytes([buf[2], buf[3]]),
        })
    }

    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let len = self.data_len.to_le_bytes();
        [self.kind, self.client_id, len[0], len[1]]
    }
}

/// One recorded drawing point. This is the shape the stroke history keeps
/// and the shape the AI scoring payload serializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawPoint {
    pub x: u16,
    pub y: u16,
    pub action: u8,
}

/// One entry of the room list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: u8,
    pub name: String,
    pub num_players: u8,
}

/// A decoded protocol message.
///
/// Client-to-server kinds: `Join`, `Ready`, `Guess`, `Leave`,
/// `PainterFinish`, `HistoryReq`, `RoomListReq`, `CreateRoom`, `JoinRoom`,
/// `LeaveRoom`. Server-to-client kinds: `GameStart`, `GameEnd`, `Error`,
/// `PainterFinish`, `HistoryData`, `HistoryEnd`, `RoomList`, `RoomCreated`,
/// `RoomJoined`, `RoomLeft`, `AiGuessResult`. `PaintData` travels both ways
/// over UDP.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Join {
        nickname: String,
    },
    Ready,
    GameStart {
        painter_id: u8,
        word: String,
        paint_time: u32,
    },
    PaintData {
        x: u16,
        y: u16,
        action: u8,
        r: u8,
        g: u8,
        b: u8,
    },
    Guess {
        guess: String,
    },
    GameEnd {
        correct_word: String,
        winner_id: u8,
        guess_count: u8,
    },
    Leave,
    Error,
    PainterFinish,
    HistoryReq,
    HistoryData {
        game_id: i32,
        word: String,
        user_guess: String,
        game_time: String,
    },
    HistoryEnd,
    RoomListReq,
    RoomList {
        rooms: Vec<RoomInfo>,
    },
    CreateRoom {
        room_name: String,
        nickname: String,
    },
    JoinRoom {
        room_id: u8,
        nickname: String,
    },
    LeaveRoom {
        room_id: u8,
    },
    RoomCreated {
        room_id: u8,
        room_name: String,
        nickname: String,
        num_players: u8,
    },
    RoomJoined {
        room_id: u8,
        room_name: String,
        nickname: String,
        num_players: u8,
    },
    RoomLeft {
        room_id: u8,
    },
    AiGuessResult {
        predicted_word: String,
        score: u8,
        is_correct: bool,
    },
}

impl Message {
    pub fn kind(&self) -> MsgKind {
        match self {
            Message::Join { .. } => MsgKind::ClientJoin,
            Message::Ready => MsgKind::ClientReady,
            Message::GameStart { .. } => MsgKind::GameStart,
            Message::PaintData { .. } => MsgKind::PaintData,
            Message::Guess { .. } => MsgKind::GuessSubmit,
            Message::GameEnd { .. } => MsgKind::GameEnd,
            Message::Leave => MsgKind::ClientLeave,
            Message::Error => MsgKind::Error,
            Message::PainterFinish => MsgKind::PainterFinish,
            Message::HistoryReq => MsgKind::HistoryReq,
            Message::HistoryData { .. } => MsgKind::HistoryData,
            Message::HistoryEnd => MsgKind::HistoryEnd,
            Message::RoomListReq => MsgKind::RoomListReq,
            Message::RoomList { .. } => MsgKind::RoomList,
            Message::CreateRoom { .. } => MsgKind::CreateRoom,
            Message::JoinRoom { .. } => MsgKind::JoinRoom,
            Message::LeaveRoom { .. } => MsgKind::LeaveRoom,
            Message::RoomCreated { .. } => MsgKind::RoomCreated,
            Message::RoomJoined { .. } => MsgKind::RoomJoined,
            Message::RoomLeft { .. } => MsgKind::RoomLeft,
            Message::AiGuessResult { .. } => MsgKind::AiGuessResult,
        }
    }

    /// Encodes the message as a complete frame, header included.
    ///
    /// `client_id` lands in the header. The server sets it to the recipient's
    /// own id on `GAME_START`, to the requester's id on `ERROR`, and to zero
    /// on other outbound frames; clients set their assigned id on everything
    /// they send.
    pub fn encode(&self, client_id: u8) -> Vec<u8> {
        let mut body: Vec<u8> = Vec::with_capacity(64);
        match self {
            Message::Join { nickname } => put_str(&mut body, nickname, NICKNAME_LEN),
            Message::Ready
            | Message::Leave
            | Message::Error
            | Message::PainterFinish
            | Message::HistoryReq
            | Message::HistoryEnd
            | Message::RoomListReq => {}
            Message::GameStart {
                painter_id,
                word,
                paint_time,
            } => {
                body.push(*painter_id);
                put_str(&mut body, word, WORD_LEN);
                body.extend_from_slice(&paint_time.to_le_bytes());
            }
            Message::PaintData {
                x,
                y,
                action,
                r,
                g,
                b,
            } => {
                body.extend_from_slice(&x.to_le_bytes());
                body.extend_from_slice(&y.to_le_bytes());
                body.push(*action);
                body.push(*r);
                body.push(*g);
                body.push(*b);
            }
            Message::Guess { guess } => put_str(&mut body, guess, GUESS_LEN),
            Message::GameEnd {
                correct_word,
                winner_id,
                guess_count,
            } => {
                put_str(&mut body, correct_word, WORD_LEN);
                body.push(*winner_id);
                body.push(*guess_count);
            }
            Message::HistoryData {
                game_id,
                word,
                user_guess,
                game_time,
            } => {
                body.extend_from_slice(&game_id.to_le_bytes());
                put_str(&mut body, word, WORD_LEN);
                put_str(&mut body, user_guess, GUESS_LEN);
                put_str(&mut body, game_time, TIME_LEN);
            }
            Message::RoomList { rooms } => {
                body.push(rooms.len().min(MAX_ROOMS) as u8);
                for i in 0..MAX_ROOMS {
                    match rooms.get(i) {
                        Some(room) => {
                            body.push(room.room_id);
                            put_str(&mut body, &room.name, ROOM_NAME_LEN);
                            body.push(room.num_players);
                        }
                        None => body.extend_from_slice(&[0u8; ROOM_INFO_LEN]),
                    }
                }
            }
            Message::CreateRoom {
                room_name,
                nickname,
            } => {
                put_str(&mut body, room_name, ROOM_NAME_LEN);
                put_str(&mut body, nickname, NICKNAME_LEN);
            }
            Message::JoinRoom { room_id, nickname } => {
                body.push(*room_id);
                put_str(&mut body, nickname, NICKNAME_LEN);
            }
            Message::LeaveRoom { room_id } | Message::RoomLeft { room_id } => {
                body.push(*room_id);
            }
            Message::RoomCreated {
                room_id,
                room_name,
                nickname,
                num_players,
            }
            | Message::RoomJoined {
                room_id,
                room_name,
                nickname,
                num_players,
            } => {
                body.push(*room_id);
                put_str(&mut body, room_name, ROOM_NAME_LEN);
                put_str(&mut body, nickname, NICKNAME_LEN);
                body.push(*num_players);
            }
            Message::AiGuessResult {
                predicted_word,
                score,
                is_correct,
            } => {
                put_str(&mut body, predicted_word, WORD_LEN);
                body.push(*score);
                body.push(u8::from(*is_correct));
            }
        }

        let header = FrameHeader {
            kind: self.kind() as u8,
            client_id,
            data_len: body.len() as u16,
        };
        let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    /// Decodes a message body for the given type code.
    pub fn decode(kind: u8, body: &[u8]) -> Result<Message, CodecError> {
        let kind = MsgKind::from_u8(kind).ok_or(CodecError::UnknownKind(kind))?;
        let expected = expected_body_len(kind);
        if body.len() != expected {
            return Err(CodecError::Length {
                expected,
                got: body.len(),
            });
        }

        let msg = match kind {
            MsgKind::ClientJoin => Message::Join {
                nickname: get_str(body, 0, NICKNAME_LEN)?,
            },
            MsgKind::ClientReady => Message::Ready,
            MsgKind::GameStart => {
                let at = 1 + WORD_LEN;
                Message::GameStart {
                    painter_id: body[0],
                    word: get_str(body, 1, WORD_LEN)?,
                    paint_time: u32::from_le_bytes([
                        body[at],
                        body[at + 1],
                        body[at + 2],
                        body[at + 3],
                    ]),
                }
            }
            MsgKind::PaintData => Message::PaintData {
                x: u16::from_le_bytes([body[0], body[1]]),
                y: u16::from_le_bytes([body[2], body[3]]),
                action: body[4],
                r: body[5],
                g: body[6],
                b: body[7],
            },
            MsgKind::GuessSubmit => Message::Guess {
                guess: get_str(body, 0, GUESS_LEN)?,
            },
            MsgKind::GameEnd => Message::GameEnd {
                correct_word: get_str(body, 0, WORD_LEN)?,
                winner_id: body[WORD_LEN],
                guess_count: body[WORD_LEN + 1],
            },
            MsgKind::ClientLeave => Message::Leave,
            MsgKind::Error => Message::Error,
            MsgKind::PainterFinish => Message::PainterFinish,
            MsgKind::HistoryReq => Message::HistoryReq,
            MsgKind::HistoryData => Message::HistoryData {
                game_id: i32::from_le_bytes([body[0], body[1], body[2], body[3]]),
                word: get_str(body, 4, WORD_LEN)?,
                user_guess: get_str(body, 4 + WORD_LEN, GUESS_LEN)?,
                game_time: get_str(body, 4 + WORD_LEN + GUESS_LEN, TIME_LEN)?,
            },
            MsgKind::HistoryEnd => Message::HistoryEnd,
            MsgKind::RoomListReq => Message::RoomListReq,
            MsgKind::RoomList => {
                let num_rooms = body[0] as usize;
                if num_rooms > MAX_ROOMS {
                    return Err(CodecError::BadValue);
                }
                let mut rooms = Vec::with_capacity(num_rooms);
                for i in 0..num_rooms {
                    let at = 1 + i * ROOM_INFO_LEN;
                    rooms.push(RoomInfo {
                        room_id: body[at],
                        name: get_str(body, at + 1, ROOM_NAME_LEN)?,
                        num_players: body[at + 1 + ROOM_NAME_LEN],
                    });
                }
                Message::RoomList { rooms }
            }
            MsgKind::CreateRoom => Message::CreateRoom {
                room_name: get_str(body, 0, ROOM_NAME_LEN)?,
                nickname: get_str(body, ROOM_NAME_LEN, NICKNAME_LEN)?,
            },
            MsgKind::JoinRoom => Message::JoinRoom {
                room_id: body[0],
                nickname: get_str(body, 1, NICKNAME_LEN)?,
            },
            MsgKind::LeaveRoom => Message::LeaveRoom { room_id: body[0] },
            MsgKind::RoomCreated => Message::RoomCreated {
                room_id: body[0],
                room_name: get_str(body, 1, ROOM_NAME_LEN)?,
                nickname: get_str(body, 1 + ROOM_NAME_LEN, NICKNAME_LEN)?,
                num_players: body[1 + ROOM_NAME_LEN + NICKNAME_LEN],
            },
            MsgKind::RoomJoined => Message::RoomJoined {
                room_id: body[0],
                room_name: get_str(body, 1, ROOM_NAME_LEN)?,
                nickname: get_str(body, 1 + ROOM_NAME_LEN, NICKNAME_LEN)?,
                num_players: body[1 + ROOM_NAME_LEN + NICKNAME_LEN],
            },
            MsgKind::RoomLeft => Message::RoomLeft { room_id: body[0] },
            MsgKind::AiGuessResult => Message::AiGuessResult {
                predicted_word: get_str(body, 0, WORD_LEN)?,
                score: body[WORD_LEN],
                is_correct: body[WORD_LEN + 1] != 0,
            },
        };
        Ok(msg)
    }

    /// Decodes a complete frame (header plus body), as received in one
    /// datagram. Returns the header alongside the message so the caller can
    /// see the sender-claimed `client_id`.
    pub fn decode_frame(frame: &[u8]) -> Result<(FrameHeader, Message), CodecError> {
        let header = FrameHeader::parse(frame)?;
        let body = &frame[HEADER_LEN..];
        if body.len() != header.data_len as usize {
            return Err(CodecError::Length {
                expected: header.data_len as usize,
                got: body.len(),
            });
        }
        let msg = Message::decode(header.kind, body)?;
        Ok((header, msg))
    }
}

fn expected_body_len(kind: MsgKind) -> usize {
    match kind {
        MsgKind::ClientJoin => JOIN_BODY_LEN,
        MsgKind::ClientReady
        | MsgKind::ClientLeave
        | MsgKind::Error
        | MsgKind::PainterFinish
        | MsgKind::HistoryReq
        | MsgKind::HistoryEnd
        | MsgKind::RoomListReq => 0,
        MsgKind::GameStart => GAME_START_BODY_LEN,
        MsgKind::PaintData => PAINT_DATA_BODY_LEN,
        MsgKind::GuessSubmit => GUESS_BODY_LEN,
        MsgKind::GameEnd => GAME_END_BODY_LEN,
        MsgKind::HistoryData => HISTORY_DATA_BODY_LEN,
        MsgKind::RoomList => ROOM_LIST_BODY_LEN,
        MsgKind::CreateRoom => CREATE_ROOM_BODY_LEN,
        MsgKind::JoinRoom => JOIN_ROOM_BODY_LEN,
        MsgKind::LeaveRoom => LEAVE_ROOM_BODY_LEN,
        MsgKind::RoomCreated | MsgKind::RoomJoined => ROOM_CREATED_BODY_LEN,
        MsgKind::RoomLeft => ROOM_LEFT_BODY_LEN,
        MsgKind::AiGuessResult => AI_RESULT_BODY_LEN,
    }
}

/// Writes `s` into a fixed-width field, clamped so the terminator always
/// fits, and zero-pads the remainder.
fn put_str(out: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width - 1);
    out.extend_from_slice(&bytes[..n]);
    out.resize(out.len() + (width - n), 0);
}

/// Reads a NUL-terminated string out of a fixed-width field.
fn get_str(body: &[u8], at: usize, width: usize) -> Result<String, CodecError> {
    let field = &body[at..at + width];
    let end = field.iter().position(|&b| b == 0).unwrap_or(width);
    String::from_utf8(field[..end].to_vec()).map_err(|_| CodecError::BadString)
}
