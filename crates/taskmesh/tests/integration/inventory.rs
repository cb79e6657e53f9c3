/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Unit conversion sanity and level-change event coherence.

use std::collections::HashMap;

use taskmesh::models::event::{Event, EventPayload};
use taskmesh::models::inventory::{InventoryItem, Unit};
use taskmesh::repository::memory::MemoryInventoryRepository;
use taskmesh::repository::InventoryRepository;

/// Scenario: add a unit `ikg` (factor 1.0, category weight), an item at
/// level 100, update the level to 80, and expect the stored level plus a
/// coherent `inventory.level_changed` payload with `below_threshold=false`
/// for threshold 20.
#[tokio::test]
async fn unit_conversion_sanity() {
    let repo = MemoryInventoryRepository::new();

    let ikg = Unit::new("ikg", "internal kilogram", "ikg", 1.0, "weight").unwrap();
    repo.create_unit(ikg.clone()).await.unwrap();

    let item = InventoryItem::new("item-1", "coffee beans", 100.0, 500.0, 20.0, "ikg").unwrap();
    repo.create_item(item).await.unwrap();

    let mut stored = repo.get_item("item-1").await.unwrap();
    let change = stored.apply_level(80.0).unwrap();
    repo.update_item(stored).await.unwrap();

    let reread = repo.get_item("item-1").await.unwrap();
    assert_eq!(reread.level, 80.0);

    let event = Event::build(
        EventPayload::InventoryLevelChanged {
            item_id: reread.id.clone(),
            item_name: reread.name.clone(),
            prev_level: change.prev_level,
            new_level: change.new_level,
            unit: reread.unit_id.clone(),
            threshold: reread.low_threshold,
            below_threshold: change.below_threshold,
        },
        "inventory-core",
        HashMap::new(),
    )
    .unwrap();

    assert!(event.validate().is_ok());
    match event.payload {
        EventPayload::InventoryLevelChanged {
            prev_level,
            new_level,
            below_threshold,
            ..
        } => {
            assert_eq!(prev_level, 100.0);
            assert_eq!(new_level, 80.0);
            assert!(!below_threshold);
        }
        other => panic!("unexpected payload {:?}", other),
    }

    // The unit resolves and converts within its category.
    let grams = Unit::new("g", "gram", "g", 0.001, "weight").unwrap();
    assert_eq!(ikg.convert(80.0, &grams).unwrap(), 80_000.0);
}
