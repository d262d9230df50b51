//! Development game engine.
//!
//! Tracks seats, stacks, a sequenced action log and dealt hole cards. It
//! enforces action ordering, seating and stack limits; betting-round and
//! showdown rules are out of its scope.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_crypto::Sha256Hasher;
use shared_types::{amount::decimal, same_address, Address, GameStateDto};

use crate::ports::{EngineError, GameEngine, GameInstance, PlayerAction};

const DEFAULT_MAX_PLAYERS: usize = 9;
const RANKS: &[u8] = b"23456789TJQKA";
const SUITS: &[u8] = b"cdhs";
/// Shown in place of a card the viewer may not see.
pub const HIDDEN_CARD: &str = "??";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Seat {
    address: Address,
    seat: usize,
    #[serde(with = "decimal")]
    stack: U256,
    #[serde(default)]
    hole_cards: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionRecord {
    index: u64,
    actor: Address,
    action: String,
    #[serde(with = "decimal")]
    amount: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableState {
    address: Address,
    owner: Address,
    #[serde(default)]
    options: Value,
    hand_number: u64,
    next_index: u64,
    #[serde(with = "decimal")]
    pot: U256,
    players: Vec<Seat>,
    actions: Vec<ActionRecord>,
}

impl TableState {
    fn max_players(&self) -> usize {
        self.options
            .get("maxPlayers")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_PLAYERS)
    }

    fn seat_of(&self, actor: &str) -> Option<usize> {
        self.players.iter().position(|p| same_address(&p.address, actor))
    }

    fn join(&mut self, action: &PlayerAction) -> Result<(), EngineError> {
        if self.seat_of(&action.actor).is_some() {
            return Err(EngineError::IllegalAction(format!(
                "{} is already seated",
                action.actor
            )));
        }
        let max = self.max_players();
        if self.players.len() >= max {
            return Err(EngineError::IllegalAction("table is full".into()));
        }
        let requested = action.data.as_deref().and_then(|d| d.parse::<usize>().ok());
        let taken = |seat: usize| self.players.iter().any(|p| p.seat == seat);
        let seat = match requested {
            Some(seat) if seat < max && !taken(seat) => seat,
            Some(seat) => {
                return Err(EngineError::IllegalAction(format!("seat {seat} unavailable")));
            }
            None => (0..max)
                .find(|s| !taken(*s))
                .ok_or_else(|| EngineError::IllegalAction("table is full".into()))?,
        };
        self.players.push(Seat {
            address: action.actor.clone(),
            seat,
            stack: action.amount,
            hole_cards: Vec::new(),
        });
        self.players.sort_by_key(|p| p.seat);
        Ok(())
    }

    fn new_hand(&mut self, seed: &str) -> Result<(), EngineError> {
        if self.players.len() < 2 {
            return Err(EngineError::IllegalAction(
                "a hand needs at least two players".into(),
            ));
        }
        let deck = shuffled_deck(&self.address, self.hand_number + 1, seed);
        if self.players.len() * 2 > deck.len() {
            return Err(EngineError::IllegalAction(
                "too many players to deal".into(),
            ));
        }
        self.hand_number += 1;
        self.pot = U256::zero();
        for (i, player) in self.players.iter_mut().enumerate() {
            player.hole_cards = vec![deck[2 * i].clone(), deck[2 * i + 1].clone()];
        }
        Ok(())
    }

    fn wager(&mut self, position: usize, amount: U256) -> Result<(), EngineError> {
        let player = &mut self.players[position];
        if amount > player.stack {
            return Err(EngineError::IllegalAction(format!(
                "{} cannot cover {}",
                player.address, amount
            )));
        }
        player.stack -= amount;
        self.pot = self.pot.saturating_add(amount);
        Ok(())
    }

    fn apply(&mut self, action: &PlayerAction) -> Result<(), EngineError> {
        if action.index != self.next_index {
            return Err(EngineError::IllegalAction(format!(
                "expected action index {}, got {}",
                self.next_index, action.index
            )));
        }

        match action.action.as_str() {
            "join" => self.join(action)?,
            "leave" => {
                let position = self.seated(&action.actor)?;
                self.players.remove(position);
            }
            "new-hand" => self.new_hand(action.data.as_deref().unwrap_or_default())?,
            "bet" | "raise" | "call" | "all-in" | "small-blind" | "big-blind" => {
                let position = self.seated(&action.actor)?;
                self.wager(position, action.amount)?;
            }
            "fold" => {
                let position = self.seated(&action.actor)?;
                self.players[position].hole_cards.clear();
            }
            _ => {
                self.seated(&action.actor)?;
            }
        }

        self.actions.push(ActionRecord {
            index: action.index,
            actor: action.actor.clone(),
            action: action.action.clone(),
            amount: action.amount,
            data: action.data.clone(),
        });
        self.next_index += 1;
        Ok(())
    }

    fn seated(&self, actor: &str) -> Result<usize, EngineError> {
        self.seat_of(actor)
            .ok_or_else(|| EngineError::IllegalAction(format!("{actor} is not seated")))
    }
}

/// 52 cards ordered by `sha256(table ‖ hand ‖ seed ‖ card)`.
fn shuffled_deck(table: &str, hand: u64, seed: &str) -> Vec<String> {
    let mut deck: Vec<([u8; 32], String)> = RANKS
        .iter()
        .flat_map(|r| SUITS.iter().map(move |s| [*r, *s]))
        .map(|card| {
            let card = String::from_utf8_lossy(&card).into_owned();
            let mut hasher = Sha256Hasher::new();
            hasher
                .update(table.to_ascii_lowercase())
                .update(hand.to_string())
                .update(seed)
                .update(&card);
            (hasher.finalize(), card)
        })
        .collect();
    deck.sort();
    deck.into_iter().map(|(_, card)| card).collect()
}

struct DevGame {
    state: TableState,
}

impl GameInstance for DevGame {
    fn perform_action(&mut self, action: &PlayerAction) -> Result<(), EngineError> {
        // Apply to a copy so a rejected action leaves no trace.
        let mut next = self.state.clone();
        next.apply(action)?;
        self.state = next;
        Ok(())
    }

    fn snapshot(&self) -> GameStateDto {
        serde_json::to_value(&self.state).unwrap_or(Value::Null)
    }

    fn serialize(&self, viewer: Option<&str>) -> GameStateDto {
        let mut view = self.state.clone();
        for player in &mut view.players {
            let own = viewer.is_some_and(|v| same_address(v, &player.address));
            if !own {
                for card in &mut player.hole_cards {
                    *card = HIDDEN_CARD.to_string();
                }
            }
        }
        serde_json::to_value(&view).unwrap_or(Value::Null)
    }
}

/// Engine backing [`DevGame`] tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevGameEngine;

impl GameEngine for DevGameEngine {
    fn new_game(&self, address: &str, owner: &str, options: &Value) -> Result<GameStateDto, EngineError> {
        if !options.is_null() && !options.is_object() {
            return Err(EngineError::MalformedState(
                "table options must be an object".into(),
            ));
        }
        let state = TableState {
            address: address.to_string(),
            owner: owner.to_string(),
            options: options.clone(),
            hand_number: 0,
            next_index: 0,
            pot: U256::zero(),
            players: Vec::new(),
            actions: Vec::new(),
        };
        serde_json::to_value(&state).map_err(|e| EngineError::MalformedState(e.to_string()))
    }

    fn restore(&self, state: &GameStateDto) -> Result<Box<dyn GameInstance>, EngineError> {
        let state: TableState = serde_json::from_value(state.clone())
            .map_err(|e| EngineError::MalformedState(e.to_string()))?;
        Ok(Box::new(DevGame { state }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TABLE: &str = "0x00000000000000000000000000000000000000ab";
    const P1: &str = "0x1111111111111111111111111111111111111111";
    const P2: &str = "0x2222222222222222222222222222222222222222";

    fn act(actor: &str, action: &str, index: u64, amount: u64) -> PlayerAction {
        PlayerAction {
            actor: actor.into(),
            action: action.into(),
            index,
            amount: U256::from(amount),
            data: None,
        }
    }

    fn seated_game() -> Box<dyn GameInstance> {
        let engine = DevGameEngine;
        let state = engine.new_game(TABLE, P1, &json!({"maxPlayers": 6})).unwrap();
        let mut game = engine.restore(&state).unwrap();
        game.perform_action(&act(P1, "join", 0, 1_000)).unwrap();
        game.perform_action(&act(P2, "join", 1, 1_000)).unwrap();
        let mut deal = act(P1, "new-hand", 2, 0);
        deal.data = Some("seed".into());
        game.perform_action(&deal).unwrap();
        game
    }

    #[test]
    fn test_action_index_must_be_next() {
        let engine = DevGameEngine;
        let state = engine.new_game(TABLE, P1, &Value::Null).unwrap();
        let mut game = engine.restore(&state).unwrap();
        assert!(game.perform_action(&act(P1, "join", 1, 10)).is_err());
        assert!(game.perform_action(&act(P1, "join", 0, 10)).is_ok());
        assert!(game.perform_action(&act(P1, "join", 0, 10)).is_err());
    }

    #[test]
    fn test_rejected_action_leaves_state_untouched() {
        let mut game = seated_game();
        let before = game.snapshot();
        assert!(game.perform_action(&act(P1, "bet", 3, 5_000)).is_err());
        assert_eq!(game.snapshot(), before);
    }

    #[test]
    fn test_wager_moves_stack_to_pot() {
        let mut game = seated_game();
        game.perform_action(&act(P1, "bet", 3, 100)).unwrap();
        let state = game.snapshot();
        assert_eq!(state["pot"], "100");
        assert_eq!(state["players"][0]["stack"], "900");
        assert_eq!(state["nextIndex"], 4);
    }

    #[test]
    fn test_projection_hides_other_hole_cards() {
        let game = seated_game();
        let full = game.snapshot();
        assert_ne!(full["players"][1]["holeCards"][0], HIDDEN_CARD);

        let p1_view = game.serialize(Some(P1));
        assert_ne!(p1_view["players"][0]["holeCards"][0], HIDDEN_CARD);
        assert_eq!(p1_view["players"][1]["holeCards"], json!([HIDDEN_CARD, HIDDEN_CARD]));

        let public = game.serialize(None);
        assert_eq!(public["players"][0]["holeCards"], json!([HIDDEN_CARD, HIDDEN_CARD]));
    }

    #[test]
    fn test_deal_is_deterministic_and_distinct() {
        let a = seated_game().snapshot();
        let b = seated_game().snapshot();
        assert_eq!(a, b);

        let cards: Vec<&Value> = a["players"]
            .as_array()
            .unwrap()
            .iter()
            .flat_map(|p| p["holeCards"].as_array().unwrap())
            .collect();
        assert_eq!(cards.len(), 4);
        for (i, card) in cards.iter().enumerate() {
            assert!(!cards[i + 1..].contains(card));
        }
    }

    #[test]
    fn test_seat_limits() {
        let engine = DevGameEngine;
        let state = engine.new_game(TABLE, P1, &json!({"maxPlayers": 1})).unwrap();
        let mut game = engine.restore(&state).unwrap();
        game.perform_action(&act(P1, "join", 0, 10)).unwrap();
        assert!(game.perform_action(&act(P2, "join", 1, 10)).is_err());
        assert!(game.perform_action(&act(P2, "fold", 1, 0)).is_err());
    }

    #[test]
    fn test_restore_rejects_garbage() {
        assert!(DevGameEngine.restore(&json!({"nope": true})).is_err());
        assert!(DevGameEngine.new_game(TABLE, P1, &json!([1, 2])).is_err());
    }
}
