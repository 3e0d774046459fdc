use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sensei_core::{JRenumbering, Renumber};
use sensei_feature_index::{JProduct, ProductMap};

#[test]
fn test_concurrent_growth_then_prune_keeps_ids_consistent() {
    let mut rng = StdRng::seed_from_u64(7);
    let batches: Vec<Vec<JProduct>> = (0..4)
        .map(|_| {
            (0..300)
                .map(|_| {
                    let len = rng.gen_range(0..4);
                    JProduct::new((0..len).map(|_| rng.gen_range(0..20)).collect())
                })
                .collect()
        })
        .collect();

    let mut map = ProductMap::new();
    std::thread::scope(|s| {
        for batch in &batches {
            let map = &map;
            s.spawn(move || {
                for key in batch {
                    let j = map.feature_to_j(key);
                    assert_eq!(map.feature_to_j(key), j);
                }
            });
        }
    });
    map.sync_j_to_feature_map();

    let distinct: HashMap<&JProduct, ()> = batches.iter().flatten().map(|k| (k, ())).collect();
    assert_eq!(map.len(), distinct.len());

    let remove: Vec<bool> = (0..map.len()).map(|_| rng.gen_bool(0.3)).collect();
    let survivors: Vec<JProduct> = map
        .all()
        .filter(|(j, _)| !remove[*j as usize])
        .map(|(_, key)| key.clone())
        .collect();

    map.remove_and_renumber_js(&JRenumbering::remove_js(&remove));

    assert_eq!(map.len(), survivors.len());
    for (new_j, key) in survivors.iter().enumerate() {
        assert_eq!(map.get(key), Some(new_j as u32));
        assert_eq!(map.j_to_feature(new_j as u32), key);
    }
}
