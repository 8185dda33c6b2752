use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use uuid::Uuid;

use crate::state::match_machine::Symbol;

/// Identifier of a live WebSocket session.
pub type ConnectionId = Uuid;

/// Role attached to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Holds the slot of the given symbol.
    Player(Symbol),
    /// Watches the match and waits in the lineup.
    Spectator,
}

impl Role {
    /// Symbol held by a player, `None` for spectators.
    pub fn symbol(self) -> Option<Symbol> {
        match self {
            Role::Player(symbol) => Some(symbol),
            Role::Spectator => None,
        }
    }

    /// Whether the role occupies a slot.
    pub fn is_player(self) -> bool {
        matches!(self, Role::Player(_))
    }
}

/// Registry entry for one live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    /// Authenticated identity behind the connection.
    pub username: String,
    /// Current role.
    pub role: Role,
}

/// Role change that must be announced to the affected connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange {
    /// Connection whose role changed.
    pub connection_id: ConnectionId,
    /// Identity behind the connection.
    pub username: String,
    /// Role after the change.
    pub role: Role,
}

/// Result of removing a connection from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Seat the connection held when it left.
    pub seat: Seat,
    /// Spectators promoted into slots that became free.
    pub promotions: Vec<RoleChange>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Slots {
    x: Option<ConnectionId>,
    o: Option<ConnectionId>,
}

impl Slots {
    fn get(&self, symbol: Symbol) -> Option<ConnectionId> {
        match symbol {
            Symbol::X => self.x,
            Symbol::O => self.o,
        }
    }

    fn set(&mut self, symbol: Symbol, holder: Option<ConnectionId>) {
        match symbol {
            Symbol::X => self.x = holder,
            Symbol::O => self.o = holder,
        }
    }
}

/// Live connections, the two player slots and the spectator lineup.
///
/// Connections are kept in arrival order. The lineup is a FIFO of spectator
/// connections; joins and demotions go to the back, promotions pop from the front.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    seats: IndexMap<ConnectionId, Seat>,
    slots: Slots,
    lineup: VecDeque<ConnectionId>,
    bypass: HashSet<String>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide the role a new connection for `username` would receive right now.
    ///
    /// With the privileged bypass on, slots are filled X then O regardless of
    /// identity. Otherwise a username that already holds a slot is forced to
    /// spectate, and the first empty slot in X, O order is used.
    pub fn assign(&self, username: &str) -> Role {
        if !self.is_bypassed(username) && self.holds_slot(username) {
            return Role::Spectator;
        }

        Symbol::ALL
            .into_iter()
            .find(|symbol| self.slots.get(*symbol).is_none())
            .map(Role::Player)
            .unwrap_or(Role::Spectator)
    }

    /// Register a new connection and return the role it was given.
    pub fn register(&mut self, connection_id: ConnectionId, username: &str) -> Role {
        let role = self.assign(username);
        self.seats.insert(
            connection_id,
            Seat {
                username: username.to_owned(),
                role,
            },
        );
        match role {
            Role::Player(symbol) => self.slots.set(symbol, Some(connection_id)),
            Role::Spectator => self.lineup.push_back(connection_id),
        }
        role
    }

    /// Remove a connection, freeing its slot and promoting waiting spectators.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<Departure> {
        let seat = self.seats.shift_remove(&connection_id)?;
        self.lineup.retain(|queued| *queued != connection_id);
        if let Role::Player(symbol) = seat.role {
            self.slots.set(symbol, None);
        }

        let promotions = self.fill_vacancies();
        Some(Departure { seat, promotions })
    }

    /// Username and role of a live connection.
    pub fn lookup(&self, connection_id: ConnectionId) -> Option<&Seat> {
        self.seats.get(&connection_id)
    }

    /// Connection currently holding the slot for `symbol`.
    pub fn holder(&self, symbol: Symbol) -> Option<(ConnectionId, &Seat)> {
        let connection_id = self.slots.get(symbol)?;
        self.seats.get(&connection_id).map(|seat| (connection_id, seat))
    }

    /// All live connections in arrival order.
    pub fn seats(&self) -> impl Iterator<Item = (ConnectionId, &Seat)> {
        self.seats.iter().map(|(id, seat)| (*id, seat))
    }

    /// Spectators in promotion order.
    pub fn lineup(&self) -> impl Iterator<Item = (ConnectionId, &Seat)> {
        self.lineup
            .iter()
            .filter_map(|id| self.seats.get(id).map(|seat| (*id, seat)))
    }

    /// Number of connections holding a slot and number of spectators.
    pub fn counts(&self) -> (usize, usize) {
        let players = Symbol::ALL
            .into_iter()
            .filter(|symbol| self.slots.get(*symbol).is_some())
            .count();
        (players, self.seats.len() - players)
    }

    /// Whether the privileged bypass is on for `username`.
    pub fn is_bypassed(&self, username: &str) -> bool {
        self.bypass.contains(username)
    }

    /// Whether any live connection of `username` holds a slot.
    pub fn holds_slot(&self, username: &str) -> bool {
        Symbol::ALL
            .into_iter()
            .any(|symbol| self.holder_username(symbol) == Some(username))
    }

    /// Turn the privileged bypass on or off for `username`.
    ///
    /// Turning it off evicts every slot held by that identity and refills the empty
    /// slots from the lineup under the normal rules.
    pub fn set_bypass(&mut self, username: &str, enabled: bool) -> Vec<RoleChange> {
        if enabled {
            self.bypass.insert(username.to_owned());
            return Vec::new();
        }

        if !self.bypass.remove(username) {
            return Vec::new();
        }

        let mut changes = Vec::new();
        for symbol in Symbol::ALL {
            let Some((connection_id, seat)) = self.holder(symbol) else {
                continue;
            };
            if seat.username == username {
                self.demote(connection_id);
                changes.push(self.role_change(connection_id));
            }
        }
        changes.extend(self.fill_vacancies());
        dedup_changes(changes)
    }

    /// Pop the earliest spectator allowed to take the slot of `filling`.
    ///
    /// A spectator is skipped while another connection of the same username holds
    /// the opposite slot, unless the bypass is on for that username.
    pub(crate) fn take_eligible_spectator(&mut self, filling: Symbol) -> Option<ConnectionId> {
        let rival = self.holder_username(filling.opponent()).map(str::to_owned);
        let index = self.lineup.iter().position(|id| {
            self.seats.get(id).is_some_and(|seat| {
                rival.as_deref() != Some(seat.username.as_str()) || self.is_bypassed(&seat.username)
            })
        })?;
        self.lineup.remove(index)
    }

    /// Put a connection into the slot of `symbol`.
    pub(crate) fn seat_player(&mut self, connection_id: ConnectionId, symbol: Symbol) {
        self.lineup.retain(|queued| *queued != connection_id);
        if let Some(seat) = self.seats.get_mut(&connection_id) {
            seat.role = Role::Player(symbol);
            self.slots.set(symbol, Some(connection_id));
        }
    }

    /// Move a player to the back of the lineup, freeing its slot.
    pub(crate) fn demote(&mut self, connection_id: ConnectionId) {
        let Some(seat) = self.seats.get_mut(&connection_id) else {
            return;
        };
        if let Role::Player(symbol) = seat.role {
            seat.role = Role::Spectator;
            self.slots.set(symbol, None);
            self.lineup.push_back(connection_id);
        }
    }

    /// Exchange the symbols of the two slot holders.
    pub(crate) fn swap_symbols(&mut self) {
        let (x, o) = (self.slots.x, self.slots.o);
        self.slots = Slots { x: o, o: x };
        for symbol in Symbol::ALL {
            if let Some(id) = self.slots.get(symbol) {
                if let Some(seat) = self.seats.get_mut(&id) {
                    seat.role = Role::Player(symbol);
                }
            }
        }
    }

    /// Describe the current role of a connection as a [`RoleChange`].
    pub(crate) fn role_change(&self, connection_id: ConnectionId) -> RoleChange {
        let (username, role) = self
            .seats
            .get(&connection_id)
            .map(|seat| (seat.username.clone(), seat.role))
            .unwrap_or_else(|| (String::new(), Role::Spectator));
        RoleChange {
            connection_id,
            username,
            role,
        }
    }

    fn holder_username(&self, symbol: Symbol) -> Option<&str> {
        self.holder(symbol).map(|(_, seat)| seat.username.as_str())
    }

    fn fill_vacancies(&mut self) -> Vec<RoleChange> {
        let mut promotions = Vec::new();
        for symbol in Symbol::ALL {
            if self.slots.get(symbol).is_some() {
                continue;
            }
            if let Some(connection_id) = self.take_eligible_spectator(symbol) {
                self.seat_player(connection_id, symbol);
                promotions.push(self.role_change(connection_id));
            }
        }
        promotions
    }
}

/// Keep only the last change per connection, preserving first-seen order.
pub(crate) fn dedup_changes(changes: Vec<RoleChange>) -> Vec<RoleChange> {
    let mut latest: IndexMap<ConnectionId, RoleChange> = IndexMap::new();
    for change in changes {
        latest.insert(change.connection_id, change);
    }
    latest.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(registry: &mut Registry, username: &str) -> (ConnectionId, Role) {
        let id = Uuid::new_v4();
        let role = registry.register(id, username);
        (id, role)
    }

    fn lineup_names(registry: &Registry) -> Vec<String> {
        registry
            .lineup()
            .map(|(_, seat)| seat.username.clone())
            .collect()
    }

    #[test]
    fn slots_fill_x_then_o_then_spectators() {
        let mut registry = Registry::new();
        assert_eq!(connect(&mut registry, "ana").1, Role::Player(Symbol::X));
        assert_eq!(connect(&mut registry, "bo").1, Role::Player(Symbol::O));
        assert_eq!(connect(&mut registry, "cy").1, Role::Spectator);
        assert_eq!(registry.counts(), (2, 1));
    }

    #[test]
    fn second_connection_of_a_player_spectates() {
        let mut registry = Registry::new();
        connect(&mut registry, "ana");
        let (_, role) = connect(&mut registry, "ana");
        assert_eq!(role, Role::Spectator);
        assert!(registry.holder(Symbol::O).is_none());
    }

    #[test]
    fn bypass_lets_one_identity_hold_both_slots() {
        let mut registry = Registry::new();
        registry.set_bypass("dev", true);
        assert_eq!(connect(&mut registry, "dev").1, Role::Player(Symbol::X));
        assert_eq!(connect(&mut registry, "dev").1, Role::Player(Symbol::O));
        assert_eq!(connect(&mut registry, "dev").1, Role::Spectator);
    }

    #[test]
    fn disabling_bypass_evicts_and_refills_under_normal_rules() {
        let mut registry = Registry::new();
        registry.set_bypass("dev", true);
        let (first, _) = connect(&mut registry, "dev");
        let (second, _) = connect(&mut registry, "dev");
        let (guest, _) = connect(&mut registry, "guest");

        let changes = registry.set_bypass("dev", false);

        assert_eq!(registry.lookup(guest).unwrap().role, Role::Player(Symbol::X));
        assert_eq!(registry.lookup(first).unwrap().role, Role::Player(Symbol::O));
        assert_eq!(registry.lookup(second).unwrap().role, Role::Spectator);
        assert_eq!(changes.len(), 3);
        assert!(!registry.is_bypassed("dev"));
        assert_eq!(lineup_names(&registry), vec!["dev".to_owned()]);
    }

    #[test]
    fn lookup_reports_username_and_role() {
        let mut registry = Registry::new();
        let (id, _) = connect(&mut registry, "ana");
        let seat = registry.lookup(id).unwrap();
        assert_eq!(seat.username, "ana");
        assert_eq!(seat.role, Role::Player(Symbol::X));
        assert!(registry.lookup(Uuid::new_v4()).is_none());
    }

    #[test]
    fn player_disconnect_promotes_earliest_spectator() {
        let mut registry = Registry::new();
        let (x, _) = connect(&mut registry, "ana");
        connect(&mut registry, "bo");
        let (cy, _) = connect(&mut registry, "cy");
        connect(&mut registry, "di");

        let departure = registry.unregister(x).unwrap();

        assert_eq!(departure.seat.role, Role::Player(Symbol::X));
        assert_eq!(
            departure.promotions,
            vec![RoleChange {
                connection_id: cy,
                username: "cy".into(),
                role: Role::Player(Symbol::X),
            }]
        );
        assert_eq!(lineup_names(&registry), vec!["di".to_owned()]);
    }

    #[test]
    fn promotion_skips_second_tab_of_remaining_player() {
        let mut registry = Registry::new();
        let (x, _) = connect(&mut registry, "ana");
        connect(&mut registry, "bo");
        connect(&mut registry, "bo");
        let (cy, _) = connect(&mut registry, "cy");

        let departure = registry.unregister(x).unwrap();

        assert_eq!(departure.promotions.len(), 1);
        assert_eq!(departure.promotions[0].connection_id, cy);
    }

    #[test]
    fn spectator_disconnect_promotes_nobody() {
        let mut registry = Registry::new();
        connect(&mut registry, "ana");
        connect(&mut registry, "bo");
        let (cy, _) = connect(&mut registry, "cy");
        connect(&mut registry, "di");

        let departure = registry.unregister(cy).unwrap();
        assert!(departure.promotions.is_empty());
        assert_eq!(lineup_names(&registry), vec!["di".to_owned()]);
    }

    #[test]
    fn unknown_connection_unregisters_to_none() {
        let mut registry = Registry::new();
        assert!(registry.unregister(Uuid::new_v4()).is_none());
    }

    #[test]
    fn swap_symbols_exchanges_slot_holders() {
        let mut registry = Registry::new();
        let (ana, _) = connect(&mut registry, "ana");
        let (bo, _) = connect(&mut registry, "bo");
        registry.swap_symbols();
        assert_eq!(registry.lookup(ana).unwrap().role, Role::Player(Symbol::O));
        assert_eq!(registry.lookup(bo).unwrap().role, Role::Player(Symbol::X));
        assert_eq!(registry.holder(Symbol::X).map(|(id, _)| id), Some(bo));
    }
}
