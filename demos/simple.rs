use cbg::CbgMap;

fn main() {
    let mut table = CbgMap::<u64, String>::new();

    table.insert(1, "hello".to_string());

    assert!(table.contains_key(&1));

    let value = table.get(&1);

    println!("Value: {:?}", value);
}
