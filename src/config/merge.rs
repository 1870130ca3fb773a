//! Base-profile merge: user config wins on leaf scalars and replaces
//! lists wholesale; maps deep-merge key by key.

pub fn merge(base: serde_yaml::Value, user: serde_yaml::Value) -> serde_yaml::Value {
    match (base, user) {
        (serde_yaml::Value::Mapping(mut base_map), serde_yaml::Value::Mapping(user_map)) => {
            for (key, user_value) in user_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge(base_value, user_value),
                    None => user_value,
                };
                base_map.insert(key, merged);
            }
            serde_yaml::Value::Mapping(base_map)
        }
        (_, user) => user,
    }
}
