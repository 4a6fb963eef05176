//! Ground item generation.

use protocol::types::{Boni, BoniAttribute, Item, ItemSubType, ItemType, Rarity};
use protocol::Vector;
use rand::Rng;
use uuid::Uuid;

/// Items generated at the centre of cell (0, 0) when it is first created.
pub const ORIGIN_ITEM_COUNT: usize = 5;

/// Roll a rarity from a 0..=100 draw.
pub fn roll_rarity<R: Rng + ?Sized>(rng: &mut R) -> Rarity {
    rarity_for(rng.random_range(0..=100))
}

fn rarity_for(roll: u32) -> Rarity {
    match roll {
        0..=50 => Rarity::Normal,
        51..=95 => Rarity::Magic,
        96..=99 => Rarity::Unique,
        _ => Rarity::Ultra,
    }
}

/// Generate a sword lying at `pos` inside the cell at `grid_cell_pos`.
pub fn generate<R: Rng + ?Sized>(rng: &mut R, grid_cell_pos: Vector, pos: Vector) -> Item {
    let vitality = Boni { attribute: BoniAttribute::Vitality, value: 10 };
    let extra = rng.random_range(2..=4);

    Item {
        uuid: Uuid::new_v4(),
        grid_cell_pos,
        item_type: ItemType::WeaponItem,
        item_sub_type: ItemSubType::Sword,
        pos,
        quantity: 1,
        rarity: roll_rarity(rng),
        quality: 100,
        min_damage: 2000,
        max_damage: 5000,
        absorb: 10,
        attack_speed: 10,
        boni: vec![vitality; 1 + extra],
    }
}

/// Generate an item somewhere within `spread` of `pos` on each axis.
pub fn scatter<R: Rng + ?Sized>(rng: &mut R, grid_cell_pos: Vector, pos: Vector, spread: i32) -> Item {
    let pos = pos.translate(rng.random_range(-spread..=spread), rng.random_range(-spread..=spread));
    generate(rng, grid_cell_pos, pos)
}

/// The unique items lying around the centre of the origin cell.
pub fn origin_items<R: Rng + ?Sized>(rng: &mut R, cell_size: i32) -> Vec<Item> {
    let half = cell_size / 2;
    let centre = Vector::new(half, half);
    (0..ORIGIN_ITEM_COUNT)
        .map(|_| {
            let mut item = scatter(rng, Vector::ZERO, centre, half);
            item.rarity = Rarity::Unique;
            item
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rarity_thresholds() {
        assert_eq!(rarity_for(0), Rarity::Normal);
        assert_eq!(rarity_for(50), Rarity::Normal);
        assert_eq!(rarity_for(51), Rarity::Magic);
        assert_eq!(rarity_for(95), Rarity::Magic);
        assert_eq!(rarity_for(96), Rarity::Unique);
        assert_eq!(rarity_for(99), Rarity::Unique);
        assert_eq!(rarity_for(100), Rarity::Ultra);
    }

    #[test]
    fn test_generated_sword() {
        let mut rng = rand::rng();
        let item = generate(&mut rng, Vector::new(1, 2), Vector::new(600, 1100));
        assert_eq!(item.item_sub_type, ItemSubType::Sword);
        assert_eq!(item.grid_cell_pos, Vector::new(1, 2));
        assert!((3..=5).contains(&item.boni.len()));
        assert!(item.boni.iter().all(|b| b.attribute == BoniAttribute::Vitality));
    }

    #[test]
    fn test_origin_items_stay_in_cell() {
        let mut rng = rand::rng();
        let items = origin_items(&mut rng, 500);
        assert_eq!(items.len(), ORIGIN_ITEM_COUNT);
        for item in items {
            assert_eq!(item.rarity, Rarity::Unique);
            assert!((0..=500).contains(&item.pos.x));
            assert!((0..=500).contains(&item.pos.y));
        }
    }
}
