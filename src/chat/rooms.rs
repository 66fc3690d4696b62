/// A chat category offered on the chat page.
#[derive(Debug, PartialEq, Eq)]
pub struct Room {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
}

pub const ROOMS: &[Room] = &[
    Room { id: "general", name: "General", icon: "💬", color: "#50B8B8" },
    Room { id: "recetas", name: "Recetas", icon: "🍳", color: "#3A9B9B" },
    Room { id: "consejos", name: "Consejos", icon: "💡", color: "#2A7A7A" },
    Room { id: "dudas", name: "Dudas", icon: "❓", color: "#FF9800" },
    Room { id: "eventos", name: "Eventos", icon: "📅", color: "#4CAF50" },
];

pub fn find(id: &str) -> Option<&'static Room> {
    ROOMS.iter().find(|room| room.id == id)
}
